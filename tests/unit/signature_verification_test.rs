// Cross-gateway webhook signature verification
//
// Each gateway verifies its vendor scheme over the raw request body;
// these tests drive the public trait the webhook endpoint uses.

use chrono::Utc;
use paybridge::config::GatewaySettings;
use paybridge::core::AppError;
use paybridge::modules::gateways::services::payfast::PayFastGateway;
use paybridge::modules::gateways::services::paystack::PayStackGateway;
use paybridge::modules::gateways::services::signatures;
use paybridge::modules::gateways::services::stripe::StripeGateway;
use paybridge::modules::gateways::services::{PaymentGateway, WebhookHeaders};

fn settings(api_key: &str, webhook_secret: &str, passphrase: Option<&str>) -> GatewaySettings {
    GatewaySettings {
        enabled: true,
        merchant_id: "10000100".to_string(),
        api_key: api_key.to_string(),
        passphrase: passphrase.map(|p| p.to_string()),
        webhook_secret: webhook_secret.to_string(),
        base_url: String::new(),
    }
}

fn header(name: &str, value: String) -> WebhookHeaders {
    let mut headers = WebhookHeaders::new();
    headers.insert(name, value);
    headers
}

#[test]
fn test_payfast_itn_accepts_correctly_signed_body() {
    let gateway = PayFastGateway::new(settings("key", "", Some("hunter2")));

    let params = "m_payment_id=TXN-1&pf_payment_id=887&payment_status=COMPLETE&amount_gross=100.00";
    let signature = signatures::md5_hex(format!("{}&passphrase=hunter2", params).as_bytes());
    let body = format!("{}&signature={}", params, signature);

    assert!(gateway
        .verify_webhook(&WebhookHeaders::new(), body.as_bytes())
        .is_ok());
}

#[test]
fn test_payfast_itn_rejects_tampered_amount() {
    let gateway = PayFastGateway::new(settings("key", "", Some("hunter2")));

    let params = "m_payment_id=TXN-1&pf_payment_id=887&payment_status=COMPLETE&amount_gross=100.00";
    let signature = signatures::md5_hex(format!("{}&passphrase=hunter2", params).as_bytes());
    let tampered = format!(
        "{}&signature={}",
        params.replace("100.00", "1.00"),
        signature
    );

    assert!(matches!(
        gateway.verify_webhook(&WebhookHeaders::new(), tampered.as_bytes()),
        Err(AppError::Signature(_))
    ));
}

#[test]
fn test_payfast_itn_is_order_sensitive() {
    let gateway = PayFastGateway::new(settings("key", "", Some("hunter2")));

    let params = "m_payment_id=TXN-1&payment_status=COMPLETE";
    let signature = signatures::md5_hex(format!("{}&passphrase=hunter2", params).as_bytes());
    let reordered = format!(
        "payment_status=COMPLETE&m_payment_id=TXN-1&signature={}",
        signature
    );

    assert!(gateway
        .verify_webhook(&WebhookHeaders::new(), reordered.as_bytes())
        .is_err());
}

#[test]
fn test_paystack_signature_round_trip() {
    let gateway = PayStackGateway::new(settings("sk_test_abc", "", None));
    let body = br#"{"event":"charge.success","data":{"reference":"TXN-2","status":"success","amount":10000}}"#;

    let signature = signatures::hmac_sha512_hex("sk_test_abc", body);
    let headers = header("x-paystack-signature", signature);

    assert!(gateway.verify_webhook(&headers, body).is_ok());
}

#[test]
fn test_paystack_signature_is_keyed_on_secret() {
    let gateway = PayStackGateway::new(settings("sk_test_abc", "", None));
    let body = br#"{"event":"charge.success"}"#;

    let signature = signatures::hmac_sha512_hex("sk_test_other", body);
    let headers = header("x-paystack-signature", signature);

    assert!(matches!(
        gateway.verify_webhook(&headers, body),
        Err(AppError::Signature(_))
    ));
}

#[test]
fn test_paystack_header_lookup_is_case_insensitive() {
    let gateway = PayStackGateway::new(settings("sk_test_abc", "", None));
    let body = br#"{"event":"charge.success"}"#;

    let signature = signatures::hmac_sha512_hex("sk_test_abc", body);
    let headers = header("X-PayStack-Signature", signature);

    assert!(gateway.verify_webhook(&headers, body).is_ok());
}

fn stripe_header(secret: &str, timestamp: i64, body: &str) -> String {
    let signed_payload = format!("{}.{}", timestamp, body);
    format!(
        "t={},v1={}",
        timestamp,
        signatures::hmac_sha256_hex(secret, signed_payload.as_bytes())
    )
}

#[test]
fn test_stripe_timestamped_signature_round_trip() {
    let gateway = StripeGateway::new(settings("sk_live", "whsec_123", None));
    let body = r#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;

    let headers = header(
        "stripe-signature",
        stripe_header("whsec_123", Utc::now().timestamp(), body),
    );

    assert!(gateway.verify_webhook(&headers, body.as_bytes()).is_ok());
}

#[test]
fn test_stripe_rejects_stale_timestamp() {
    let gateway = StripeGateway::new(settings("sk_live", "whsec_123", None));
    let body = r#"{"type":"payment_intent.succeeded"}"#;

    // Well outside the 5 minute tolerance window.
    let stale = Utc::now().timestamp() - 3600;
    let headers = header("stripe-signature", stripe_header("whsec_123", stale, body));

    assert!(matches!(
        gateway.verify_webhook(&headers, body.as_bytes()),
        Err(AppError::Signature(_))
    ));
}

#[test]
fn test_stripe_rejects_signature_over_different_body() {
    let gateway = StripeGateway::new(settings("sk_live", "whsec_123", None));
    let signed_body = r#"{"type":"payment_intent.succeeded"}"#;
    let delivered_body = r#"{"type":"payment_intent.payment_failed"}"#;

    let headers = header(
        "stripe-signature",
        stripe_header("whsec_123", Utc::now().timestamp(), signed_body),
    );

    assert!(gateway
        .verify_webhook(&headers, delivered_body.as_bytes())
        .is_err());
}

#[test]
fn test_missing_signature_header_is_rejected() {
    let gateway = PayStackGateway::new(settings("sk_test_abc", "", None));
    let result = gateway.verify_webhook(&WebhookHeaders::new(), b"{}");
    assert!(matches!(result, Err(AppError::Signature(_))));
}
