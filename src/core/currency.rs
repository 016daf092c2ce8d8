use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::AppError;

/// Supported currencies with their decimal precision rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(3)", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// South African Rand
    ZAR,
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound
    GBP,
    /// Nigerian Naira
    NGN,
}

impl Currency {
    /// Returns the decimal scale for this currency (all 2 decimal places)
    pub fn scale(&self) -> u32 {
        2
    }

    /// Rounds a decimal value to the appropriate scale for this currency
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp(self.scale())
    }

    /// Validates that a decimal value has the correct scale for this currency
    pub fn validate_amount(&self, amount: Decimal) -> super::error::Result<()> {
        if amount.scale() > self.scale() {
            return Err(AppError::amount(format!(
                "{} amounts must have at most {} decimal places, got {}",
                self,
                self.scale(),
                amount.scale()
            )));
        }

        if amount <= Decimal::ZERO {
            return Err(AppError::amount(format!("{} amount must be positive", self)));
        }

        Ok(())
    }

    /// Amount expressed in minor units (cents), as several gateway APIs expect
    pub fn to_minor_units(&self, amount: Decimal) -> i64 {
        (amount * Decimal::from(100))
            .round()
            .try_into()
            .unwrap_or(i64::MAX)
    }

    /// Formats an amount for display with the correct decimal places
    pub fn format_amount(&self, amount: Decimal) -> String {
        format!("{} {:.2}", self, amount)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::ZAR => write!(f, "ZAR"),
            Currency::USD => write!(f, "USD"),
            Currency::EUR => write!(f, "EUR"),
            Currency::GBP => write!(f, "GBP"),
            Currency::NGN => write!(f, "NGN"),
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ZAR" => Ok(Currency::ZAR),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "NGN" => Ok(Currency::NGN),
            _ => Err(format!("Invalid currency: {}", s)),
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<&str> for Currency {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}
