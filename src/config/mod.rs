use crate::core::{AppError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

pub mod database;
pub mod server;

pub use database::DatabaseConfig;
pub use server::ServerConfig;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub payfast: GatewaySettings,
    pub paystack: GatewaySettings,
    pub paypal: GatewaySettings,
    pub stripe: GatewaySettings,
    pub ozow: GatewaySettings,
    pub zapper: GatewaySettings,
    pub snapscan: GatewaySettings,
    pub vodapay: GatewaySettings,
    pub eft: GatewaySettings,
    pub crypto: GatewaySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
}

/// Transaction limits and bookkeeping defaults
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub rate_limit_per_minute: u32,
    pub max_retry_attempts: u32,
    pub webhook_lock_seconds: i64,
    /// Failed billing attempts a subscription survives before going past due
    pub subscription_max_attempts: i32,
    pub grace_period_days: i64,
}

/// Credentials and toggles for one payment gateway
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub enabled: bool,
    pub merchant_id: String,
    pub api_key: String,
    pub passphrase: Option<String>,
    pub webhook_secret: String,
    pub base_url: String,
}

impl GatewaySettings {
    /// Load settings for one gateway from `{PREFIX}_*` environment variables.
    ///
    /// A gateway with `{PREFIX}_ENABLED=false` (the default) is registered but
    /// reported unavailable; its credentials may be empty.
    pub fn from_env(prefix: &str, default_base_url: &str) -> Self {
        let var = |suffix: &str| env::var(format!("{}_{}", prefix, suffix));

        GatewaySettings {
            enabled: var("ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            merchant_id: var("MERCHANT_ID").unwrap_or_default(),
            api_key: var("API_KEY").unwrap_or_default(),
            passphrase: var("PASSPHRASE").ok().filter(|p| !p.is_empty()),
            webhook_secret: var("WEBHOOK_SECRET").unwrap_or_default(),
            base_url: var("BASE_URL").unwrap_or_else(|_| default_base_url.to_string()),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let parse_amount = |name: &str, default: &str| -> Result<Decimal> {
            let raw = env::var(name).unwrap_or_else(|_| default.to_string());
            Decimal::from_str(&raw)
                .map_err(|_| AppError::Configuration(format!("Invalid {}", name)))
        };

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            limits: LimitsConfig {
                min_amount: parse_amount("PAYMENT_MIN_AMOUNT", "1.00")?,
                max_amount: parse_amount("PAYMENT_MAX_AMOUNT", "1000000.00")?,
                rate_limit_per_minute: env::var("RATE_LIMIT_PER_MINUTE")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration("Invalid RATE_LIMIT_PER_MINUTE".to_string())
                    })?,
                max_retry_attempts: env::var("PAYMENT_MAX_RETRY_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration("Invalid PAYMENT_MAX_RETRY_ATTEMPTS".to_string())
                    })?,
                webhook_lock_seconds: env::var("WEBHOOK_LOCK_SECONDS")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration("Invalid WEBHOOK_LOCK_SECONDS".to_string())
                    })?,
                subscription_max_attempts: env::var("SUBSCRIPTION_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration("Invalid SUBSCRIPTION_MAX_ATTEMPTS".to_string())
                    })?,
                grace_period_days: env::var("SUBSCRIPTION_GRACE_PERIOD_DAYS")
                    .unwrap_or_else(|_| "7".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration(
                            "Invalid SUBSCRIPTION_GRACE_PERIOD_DAYS".to_string(),
                        )
                    })?,
            },
            payfast: GatewaySettings::from_env("PAYFAST", "https://www.payfast.co.za"),
            paystack: GatewaySettings::from_env("PAYSTACK", "https://api.paystack.co"),
            paypal: GatewaySettings::from_env("PAYPAL", "https://api-m.paypal.com"),
            stripe: GatewaySettings::from_env("STRIPE", "https://api.stripe.com"),
            ozow: GatewaySettings::from_env("OZOW", "https://api.ozow.com"),
            zapper: GatewaySettings::from_env("ZAPPER", "https://api.zapper.com"),
            snapscan: GatewaySettings::from_env("SNAPSCAN", "https://pos.snapscan.io"),
            vodapay: GatewaySettings::from_env("VODAPAY", "https://api.vodapay.vodacom.co.za"),
            eft: GatewaySettings::from_env("EFT", ""),
            crypto: GatewaySettings::from_env("CRYPTO", "https://api.coingate.com"),
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.limits.min_amount <= Decimal::ZERO {
            return Err(AppError::Configuration(
                "Minimum amount must be greater than zero".to_string(),
            ));
        }

        if self.limits.max_amount < self.limits.min_amount {
            return Err(AppError::Configuration(
                "Maximum amount must not be below minimum amount".to_string(),
            ));
        }

        if self.limits.rate_limit_per_minute == 0 {
            return Err(AppError::Configuration(
                "Rate limit must be greater than 0".to_string(),
            ));
        }

        if self.limits.max_retry_attempts == 0 {
            return Err(AppError::Configuration(
                "Max retry attempts must be greater than 0".to_string(),
            ));
        }

        if self.limits.subscription_max_attempts <= 0 {
            return Err(AppError::Configuration(
                "Subscription max attempts must be greater than 0".to_string(),
            ));
        }

        self.database.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_limits() -> LimitsConfig {
        LimitsConfig {
            min_amount: Decimal::new(100, 2),
            max_amount: Decimal::new(100_000_000, 2),
            rate_limit_per_minute: 1000,
            max_retry_attempts: 3,
            webhook_lock_seconds: 120,
            subscription_max_attempts: 3,
            grace_period_days: 7,
        }
    }

    fn test_config(limits: LimitsConfig) -> Config {
        let gateway = GatewaySettings {
            enabled: false,
            merchant_id: String::new(),
            api_key: String::new(),
            passphrase: None,
            webhook_secret: String::new(),
            base_url: String::new(),
        };
        Config {
            app: AppConfig {
                env: "test".to_string(),
                log_level: "debug".to_string(),
            },
            database: DatabaseConfig {
                url: "mysql://localhost/test".to_string(),
                min_connections: 1,
                max_connections: 2,
                acquire_timeout_secs: 5,
                idle_timeout_secs: 60,
                max_lifetime_secs: 300,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                workers: 1,
            },
            limits,
            payfast: gateway.clone(),
            paystack: gateway.clone(),
            paypal: gateway.clone(),
            stripe: gateway.clone(),
            ozow: gateway.clone(),
            zapper: gateway.clone(),
            snapscan: gateway.clone(),
            vodapay: gateway.clone(),
            eft: gateway.clone(),
            crypto: gateway,
        }
    }

    #[test]
    fn test_validate_accepts_sane_limits() {
        assert!(test_config(test_limits()).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_amount_bounds() {
        let mut limits = test_limits();
        limits.max_amount = Decimal::new(50, 2);
        assert!(test_config(limits).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_subscription_attempts() {
        let mut limits = test_limits();
        limits.subscription_max_attempts = 0;
        assert!(test_config(limits).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_rate_limit() {
        let mut limits = test_limits();
        limits.rate_limit_per_minute = 0;
        assert!(test_config(limits).validate().is_err());
    }
}
