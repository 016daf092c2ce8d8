use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::gateway_trait::PaymentGateway;
use super::{
    crypto::CryptoGateway, eft::EftGateway, ozow::OzowGateway, payfast::PayFastGateway,
    paypal::PayPalGateway, paystack::PayStackGateway, snapscan::SnapScanGateway,
    stripe::StripeGateway, vodapay::VodaPayGateway, zapper::ZapperGateway,
};
use crate::config::Config;
use crate::core::{AppError, Currency, Result};

struct RegisteredGateway {
    driver: Arc<dyn PaymentGateway>,
    enabled: bool,
}

/// Registry routing gateway names to their drivers
///
/// A registered but disabled gateway is listed as unavailable; resolving it
/// for a payment or webhook fails.
pub struct GatewayRegistry {
    gateways: HashMap<String, RegisteredGateway>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self {
            gateways: HashMap::new(),
        }
    }

    /// Build the registry with every driver wired to its configuration
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();

        registry.register(
            Arc::new(PayFastGateway::new(config.payfast.clone())),
            config.payfast.enabled,
        );
        registry.register(
            Arc::new(PayStackGateway::new(config.paystack.clone())),
            config.paystack.enabled,
        );
        registry.register(
            Arc::new(PayPalGateway::new(config.paypal.clone())),
            config.paypal.enabled,
        );
        registry.register(
            Arc::new(StripeGateway::new(config.stripe.clone())),
            config.stripe.enabled,
        );
        registry.register(
            Arc::new(OzowGateway::new(config.ozow.clone())),
            config.ozow.enabled,
        );
        registry.register(
            Arc::new(ZapperGateway::new(config.zapper.clone())),
            config.zapper.enabled,
        );
        registry.register(
            Arc::new(SnapScanGateway::new(config.snapscan.clone())),
            config.snapscan.enabled,
        );
        registry.register(
            Arc::new(VodaPayGateway::new(config.vodapay.clone())),
            config.vodapay.enabled,
        );
        registry.register(
            Arc::new(EftGateway::new(config.eft.clone())),
            config.eft.enabled,
        );
        registry.register(
            Arc::new(CryptoGateway::new(config.crypto.clone())),
            config.crypto.enabled,
        );

        let enabled: Vec<&str> = registry
            .gateways
            .values()
            .filter(|g| g.enabled)
            .map(|g| g.driver.name())
            .collect();
        info!(enabled = ?enabled, "Gateway registry initialized");

        registry
    }

    /// Register a gateway driver
    pub fn register(&mut self, driver: Arc<dyn PaymentGateway>, enabled: bool) {
        let name = driver.name().to_string();
        self.gateways
            .insert(name, RegisteredGateway { driver, enabled });
    }

    /// Resolve an enabled gateway by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn PaymentGateway>> {
        let registered = self
            .gateways
            .get(name)
            .ok_or_else(|| AppError::not_found(format!("Gateway '{}'", name)))?;

        if !registered.enabled {
            return Err(AppError::unavailable(format!(
                "Gateway '{}' is disabled",
                name
            )));
        }

        Ok(registered.driver.clone())
    }

    /// Check whether a gateway is registered and enabled
    pub fn is_available(&self, name: &str) -> bool {
        self.gateways
            .get(name)
            .map(|g| g.enabled)
            .unwrap_or(false)
    }

    /// List all registered gateways
    pub fn list(&self) -> Vec<GatewayInfo> {
        let mut gateways: Vec<GatewayInfo> = self
            .gateways
            .values()
            .map(|registered| GatewayInfo {
                name: registered.driver.name().to_string(),
                enabled: registered.enabled,
                supported_currencies: [
                    Currency::ZAR,
                    Currency::USD,
                    Currency::EUR,
                    Currency::GBP,
                    Currency::NGN,
                ]
                .iter()
                .filter(|c| registered.driver.supports_currency(**c))
                .map(|c| c.to_string())
                .collect(),
                supports_recurring: registered.driver.supports_recurring(),
                supports_webhooks: registered.driver.supports_webhooks(),
            })
            .collect();

        gateways.sort_by(|a, b| a.name.cmp(&b.name));
        gateways
    }
}

impl Default for GatewayRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Gateway information for listing
#[derive(Debug, Clone, serde::Serialize)]
pub struct GatewayInfo {
    pub name: String,
    pub enabled: bool,
    pub supported_currencies: Vec<String>,
    pub supports_recurring: bool,
    pub supports_webhooks: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewaySettings;

    fn settings(enabled: bool) -> GatewaySettings {
        GatewaySettings {
            enabled,
            merchant_id: "m".to_string(),
            api_key: "k".to_string(),
            passphrase: None,
            webhook_secret: "s".to_string(),
            base_url: String::new(),
        }
    }

    #[test]
    fn test_disabled_gateway_is_unavailable() {
        let mut registry = GatewayRegistry::new();
        registry.register(Arc::new(EftGateway::new(settings(false))), false);

        assert!(!registry.is_available("eft"));
        assert!(matches!(
            registry.get("eft"),
            Err(AppError::GatewayUnavailable(_))
        ));
    }

    #[test]
    fn test_enabled_gateway_resolves() {
        let mut registry = GatewayRegistry::new();
        registry.register(Arc::new(EftGateway::new(settings(true))), true);

        assert!(registry.is_available("eft"));
        assert!(registry.get("eft").is_ok());
    }

    #[test]
    fn test_unknown_gateway_not_found() {
        let registry = GatewayRegistry::new();
        assert!(!registry.is_available("nonexistent"));
        assert!(matches!(
            registry.get("nonexistent"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_reports_capabilities() {
        let mut registry = GatewayRegistry::new();
        registry.register(Arc::new(EftGateway::new(settings(true))), true);
        registry.register(Arc::new(PayFastGateway::new(settings(true))), true);

        let listing = registry.list();
        assert_eq!(listing.len(), 2);

        let payfast = listing.iter().find(|g| g.name == "payfast").unwrap();
        assert!(payfast.supports_recurring);
        assert_eq!(payfast.supported_currencies, vec!["ZAR".to_string()]);

        let eft = listing.iter().find(|g| g.name == "eft").unwrap();
        assert!(!eft.supports_webhooks);
    }
}
