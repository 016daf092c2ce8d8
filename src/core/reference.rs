use uuid::Uuid;

/// Merchant reference prefixes for the entities correlated across systems
const TRANSACTION_PREFIX: &str = "TXN";
const REFUND_PREFIX: &str = "RFD";
const SUBSCRIPTION_PREFIX: &str = "SUB";

fn generate(prefix: &str) -> String {
    let fragment = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}-{}", prefix, &fragment[..20])
}

/// Generate a unique transaction reference (`TXN-...`)
pub fn transaction_reference() -> String {
    generate(TRANSACTION_PREFIX)
}

/// Generate a unique refund reference (`RFD-...`)
pub fn refund_reference() -> String {
    generate(REFUND_PREFIX)
}

/// Generate a unique subscription reference (`SUB-...`)
pub fn subscription_reference() -> String {
    generate(SUBSCRIPTION_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_reference_prefix() {
        let reference = transaction_reference();
        assert!(reference.starts_with("TXN-"));
        assert_eq!(reference.len(), 24);
    }

    #[test]
    fn test_references_are_unique() {
        let a = transaction_reference();
        let b = transaction_reference();
        assert_ne!(a, b);
    }

    #[test]
    fn test_refund_and_subscription_prefixes() {
        assert!(refund_reference().starts_with("RFD-"));
        assert!(subscription_reference().starts_with("SUB-"));
    }
}
