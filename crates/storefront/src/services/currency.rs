//! Exchange rate lookup.
//!
//! Every checkout render quotes the current rates into the session and the
//! order is priced from that quote, so the amount charged is the amount the
//! customer was shown.

use guoyan_core::ExchangeRates;
use tower_sessions::Session;
use tracing::instrument;

use crate::config::RateSource;
use crate::models::{QuotedRates, session_keys};
use crate::state::AppState;

/// Rates for one checkout page render.
///
/// Reads the configured source and falls back to the configured defaults,
/// logging a warning, when the source is unavailable.
#[instrument(skip(state))]
pub async fn current_rates(state: &AppState) -> ExchangeRates {
    let config = state.config();
    let result = match &config.rate_source {
        RateSource::Database => state.backend().currency_rates().await,
        RateSource::Live { api_url } => state.backend().live_rates(api_url).await,
    };

    result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Exchange rates unavailable, using defaults");
        config.default_rates
    })
}

/// Fetch rates for a checkout render and remember them as the visitor's
/// quote.
///
/// # Errors
///
/// Returns an error if the quote cannot be written to the session.
#[instrument(skip(state, session))]
pub async fn quote_rates(
    state: &AppState,
    session: &Session,
) -> Result<ExchangeRates, tower_sessions::session::Error> {
    let rates = current_rates(state).await;
    session
        .insert(session_keys::QUOTED_RATES, QuotedRates::from(rates))
        .await?;
    Ok(rates)
}

/// Rates to price an order with: the visitor's last quote, or current
/// rates when there is none.
///
/// # Errors
///
/// Returns an error if a fresh quote cannot be stored.
#[instrument(skip(state, session))]
pub async fn quoted_rates(
    state: &AppState,
    session: &Session,
) -> Result<ExchangeRates, tower_sessions::session::Error> {
    let quote = session
        .get::<QuotedRates>(session_keys::QUOTED_RATES)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Discarding unreadable rate quote");
            None
        });

    match quote.map(QuotedRates::rates) {
        Some(Ok(rates)) => Ok(rates),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Discarding invalid rate quote");
            quote_rates(state, session).await
        }
        None => quote_rates(state, session).await,
    }
}
