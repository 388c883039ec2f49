//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

use guoyan_core::payment_qr::qr_image_url;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// Image URL for a QR code encoding the value.
///
/// Usage in templates: `{{ code_url|qr_image }}`
#[askama::filter_fn]
pub fn qr_image(payment_url: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(qr_image_url(&payment_url.to_string()))
}
