//! Decimal money amounts, currencies and exchange rates.
//!
//! Catalog prices are quoted in US dollars. Checkout converts the subtotal
//! into the settlement currency of the chosen payment method (CNY for
//! Alipay, WeChat Pay and manual payment, CAD for e-Transfer). Conversions
//! round half-up to two decimal places so the displayed figure and the
//! figure sent to the payment function are always the same.

use core::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of decimal places used for every displayed or submitted amount.
pub const MONEY_SCALE: u32 = 2;

/// Round an amount half-up (midpoint away from zero) to [`MONEY_SCALE`].
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// ISO 4217 currency codes the storefront deals in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    CNY,
    CAD,
}

impl CurrencyCode {
    /// Symbol shown in front of an amount.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD => "$",
            Self::CNY => "¥",
            Self::CAD => "C$",
        }
    }

    /// Three-letter ISO code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::CNY => "CNY",
            Self::CAD => "CAD",
        }
    }
}

/// An amount of money in a given currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit (yuan, dollars), not cents.
    pub amount: Decimal,
    /// Currency of the amount.
    pub currency: CurrencyCode,
}

impl Money {
    /// Create a new amount.
    #[must_use]
    pub const fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    /// A US dollar amount.
    #[must_use]
    pub const fn usd(amount: Decimal) -> Self {
        Self::new(amount, CurrencyCode::USD)
    }

    /// Format for display, e.g. `$19.99` or `¥71.04`.
    #[must_use]
    pub fn display(&self) -> String {
        format!("{}{:.2}", self.currency.symbol(), round_money(self.amount))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Errors constructing an [`ExchangeRate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateError {
    /// Rates must be strictly positive.
    #[error("exchange rate must be positive, got {0}")]
    NotPositive(Decimal),
}

/// A USD → target currency exchange rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeRate {
    rate: Decimal,
    target: CurrencyCode,
}

impl ExchangeRate {
    /// Create a rate converting US dollars into `target`.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::NotPositive`] for zero or negative rates.
    pub fn new(rate: Decimal, target: CurrencyCode) -> Result<Self, RateError> {
        if rate <= Decimal::ZERO {
            return Err(RateError::NotPositive(rate));
        }
        Ok(Self { rate, target })
    }

    /// The raw multiplier.
    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.rate
    }

    /// Currency this rate converts into.
    #[must_use]
    pub const fn target(&self) -> CurrencyCode {
        self.target
    }

    /// Convert a USD amount: `amount * rate`, rounded half-up to 2 places.
    #[must_use]
    pub fn convert(&self, usd_amount: Decimal) -> Money {
        Money::new(round_money(usd_amount * self.rate), self.target)
    }
}

/// The pair of rates a checkout session works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeRates {
    /// USD → CNY.
    pub usd_cny: ExchangeRate,
    /// USD → CAD.
    pub usd_cad: ExchangeRate,
}

impl ExchangeRates {
    /// Build both rates from raw decimals.
    ///
    /// # Errors
    ///
    /// Returns [`RateError`] if either rate is not positive.
    pub fn new(usd_cny: Decimal, usd_cad: Decimal) -> Result<Self, RateError> {
        Ok(Self {
            usd_cny: ExchangeRate::new(usd_cny, CurrencyCode::CNY)?,
            usd_cad: ExchangeRate::new(usd_cad, CurrencyCode::CAD)?,
        })
    }

    /// Rate converting into the given settlement currency.
    ///
    /// USD settles at par.
    #[must_use]
    pub fn for_currency(&self, currency: CurrencyCode) -> Option<ExchangeRate> {
        match currency {
            CurrencyCode::CNY => Some(self.usd_cny),
            CurrencyCode::CAD => Some(self.usd_cad),
            CurrencyCode::USD => None,
        }
    }
}

impl Default for ExchangeRates {
    /// 7.1 CNY and 1.38 CAD per US dollar.
    fn default() -> Self {
        Self {
            usd_cny: ExchangeRate {
                rate: Decimal::new(71, 1),
                target: CurrencyCode::CNY,
            },
            usd_cad: ExchangeRate {
                rate: Decimal::new(138, 2),
                target: CurrencyCode::CAD,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_convert_rounds_half_up() {
        let rate = ExchangeRate::new(dec("7.1"), CurrencyCode::CNY).unwrap();
        // 10.005 * 7.1 = 71.0355
        assert_eq!(rate.convert(dec("10.005")).amount, dec("71.04"));
        assert_eq!(rate.convert(dec("10.005")).display(), "¥71.04");
    }

    #[test]
    fn test_convert_midpoint_goes_up() {
        let rate = ExchangeRate::new(dec("1"), CurrencyCode::CAD).unwrap();
        assert_eq!(rate.convert(dec("2.345")).amount, dec("2.35"));
        assert_eq!(rate.convert(dec("2.344")).amount, dec("2.34"));
    }

    #[test]
    fn test_convert_zero() {
        let rates = ExchangeRates::default();
        assert_eq!(rates.usd_cny.convert(Decimal::ZERO).display(), "¥0.00");
        assert_eq!(rates.usd_cad.convert(Decimal::ZERO).display(), "C$0.00");
    }

    #[test]
    fn test_convert_cad_path() {
        let rate = ExchangeRate::new(dec("1.38"), CurrencyCode::CAD).unwrap();
        // 19.99 * 1.38 = 27.5862
        assert_eq!(rate.convert(dec("19.99")).amount, dec("27.59"));
        // 0.005 * 1.38 = 0.0069
        assert_eq!(rate.convert(dec("0.005")).amount, dec("0.01"));
    }

    #[test]
    fn test_rate_must_be_positive() {
        assert!(matches!(
            ExchangeRate::new(Decimal::ZERO, CurrencyCode::CNY),
            Err(RateError::NotPositive(_))
        ));
        assert!(ExchangeRates::new(dec("-1"), dec("1.38")).is_err());
    }

    #[test]
    fn test_default_rates() {
        let rates = ExchangeRates::default();
        assert_eq!(rates.usd_cny.value(), dec("7.1"));
        assert_eq!(rates.usd_cad.value(), dec("1.38"));
        assert_eq!(rates.for_currency(CurrencyCode::USD), None);
    }

    #[test]
    fn test_money_display_pads_to_two_places() {
        assert_eq!(Money::usd(dec("12.5")).display(), "$12.50");
        assert_eq!(Money::usd(dec("3")).to_string(), "$3.00");
    }
}
