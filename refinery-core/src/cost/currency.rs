//! Static USD-relative currency conversion
//!
//! All pricing tables are denominated in USD. Conversion is linear:
//! `amount_in_currency = amount_usd * rate(currency)` with `rate(USD) = 1`.
//! Converting to a currency without a known rate is an error; there is no
//! silent default.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by currency conversion
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CurrencyError {
    #[error("Unsupported currency: {0}")]
    Unsupported(String),

    #[error("Invalid exchange rate for {currency}: {rate}")]
    InvalidRate { currency: Currency, rate: f64 },
}

/// Supported currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Jpy,
    Cad,
    Aud,
}

impl Currency {
    pub const ALL: [Currency; 6] = [
        Currency::Usd,
        Currency::Eur,
        Currency::Gbp,
        Currency::Jpy,
        Currency::Cad,
        Currency::Aud,
    ];

    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Jpy => "JPY",
            Currency::Cad => "CAD",
            Currency::Aud => "AUD",
        }
    }

    /// Built-in USD-relative rate
    pub fn default_rate(&self) -> f64 {
        match self {
            Currency::Usd => 1.0,
            Currency::Eur => 0.92,
            Currency::Gbp => 0.79,
            Currency::Jpy => 149.5,
            Currency::Cad => 1.36,
            Currency::Aud => 1.52,
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::Usd
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        Currency::ALL
            .into_iter()
            .find(|c| c.code() == code)
            .ok_or_else(|| CurrencyError::Unsupported(s.to_string()))
    }
}

/// Converts USD amounts into other currencies using a fixed rate table
#[derive(Debug, Clone)]
pub struct CurrencyConverter {
    rates: HashMap<Currency, f64>,
}

impl Default for CurrencyConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl CurrencyConverter {
    /// Converter with the built-in rate table
    pub fn new() -> Self {
        Self {
            rates: Currency::ALL
                .into_iter()
                .map(|c| (c, c.default_rate()))
                .collect(),
        }
    }

    /// Converter with some rates overridden.
    ///
    /// USD is pinned to 1.0 and cannot be overridden.
    pub fn with_rates(overrides: HashMap<Currency, f64>) -> Result<Self, CurrencyError> {
        let mut converter = Self::new();
        for (currency, rate) in overrides {
            if currency == Currency::Usd {
                continue;
            }
            if !rate.is_finite() || rate <= 0.0 {
                return Err(CurrencyError::InvalidRate { currency, rate });
            }
            converter.rates.insert(currency, rate);
        }
        Ok(converter)
    }

    /// USD-relative rate for `currency`
    pub fn rate(&self, currency: Currency) -> f64 {
        self.rates
            .get(&currency)
            .copied()
            .unwrap_or_else(|| currency.default_rate())
    }

    /// Convert a USD amount
    pub fn convert(&self, amount_usd: f64, currency: Currency) -> f64 {
        amount_usd * self.rate(currency)
    }

    /// Convert a USD amount into the currency named by an ISO code
    pub fn convert_code(&self, amount_usd: f64, code: &str) -> Result<f64, CurrencyError> {
        let currency: Currency = code.parse()?;
        Ok(self.convert(amount_usd, currency))
    }
}
