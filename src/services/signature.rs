use hmac::{Hmac, Mac};
use metrics::counter;
use sha2::Sha256;
use tracing::warn;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 verification of payment gateway signatures.
///
/// Holds the two gateway secrets. A missing secret is a configuration
/// error and is reported separately from a signature mismatch.
#[derive(Clone, Default)]
pub struct SignatureVerifier {
    key_secret: Option<String>,
    webhook_secret: Option<String>,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("key_secret", &self.key_secret.as_ref().map(|_| "***"))
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "***"))
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(key_secret: Option<String>, webhook_secret: Option<String>) -> Self {
        Self {
            key_secret: key_secret.filter(|s| !s.is_empty()),
            webhook_secret: webhook_secret.filter(|s| !s.is_empty()),
        }
    }

    /// Verifies a client-side confirmation signed over `gateway_order_id|gateway_payment_id`
    pub fn verify_payment(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Result<(), ServiceError> {
        let secret = self.key_secret.as_deref().ok_or_else(|| {
            ServiceError::ConfigurationError("payment key secret is not configured".to_string())
        })?;
        let payload = format!("{}|{}", gateway_order_id, gateway_payment_id);
        verify_hmac(secret, payload.as_bytes(), signature, "payment")
    }

    /// Verifies a webhook delivery over the raw, unparsed body
    pub fn verify_webhook(&self, body: &[u8], signature: Option<&str>) -> Result<(), ServiceError> {
        let secret = self.webhook_secret.as_deref().ok_or_else(|| {
            ServiceError::ConfigurationError("payment webhook secret is not configured".to_string())
        })?;
        let signature = signature.ok_or_else(|| {
            counter!("storefront.payments.signature_failures", 1, "source" => "webhook");
            warn!("Webhook delivered without a signature header");
            ServiceError::Unauthorized("missing webhook signature".to_string())
        })?;
        verify_hmac(secret, body, signature, "webhook")
    }
}

/// Hex-encoded HMAC-SHA256 of `payload`
pub fn sign(secret: &str, payload: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn verify_hmac(
    secret: &str,
    payload: &[u8],
    signature: &str,
    source: &'static str,
) -> Result<(), ServiceError> {
    let reject = || {
        counter!("storefront.payments.signature_failures", 1, "source" => source);
        warn!(source, "Payment signature verification failed");
        ServiceError::Unauthorized("invalid payment signature".to_string())
    };

    let provided = hex::decode(signature.trim()).map_err(|_| reject())?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(format!("hmac init failed: {}", e)))?;
    mac.update(payload);
    // verify_slice compares in constant time
    mac.verify_slice(&provided).map_err(|_| reject())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    const KEY: &str = "key_secret_test";
    const WEBHOOK: &str = "whsec_test";

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(Some(KEY.into()), Some(WEBHOOK.into()))
    }

    #[test]
    fn accepts_valid_payment_signature() {
        let sig = sign(KEY, b"order_abc|pay_123");
        assert!(verifier().verify_payment("order_abc", "pay_123", &sig).is_ok());
    }

    #[test]
    fn accepts_uppercase_hex() {
        let sig = sign(KEY, b"order_abc|pay_123").to_uppercase();
        assert!(verifier().verify_payment("order_abc", "pay_123", &sig).is_ok());
    }

    #[test]
    fn rejects_swapped_ids() {
        let sig = sign(KEY, b"order_abc|pay_123");
        assert_matches!(
            verifier().verify_payment("pay_123", "order_abc", &sig),
            Err(ServiceError::Unauthorized(_))
        );
    }

    #[test]
    fn rejects_non_hex_signature() {
        assert_matches!(
            verifier().verify_payment("order_abc", "pay_123", "not-hex!"),
            Err(ServiceError::Unauthorized(_))
        );
    }

    #[test]
    fn missing_secret_is_configuration_error() {
        let unconfigured = SignatureVerifier::new(None, Some(String::new()));
        assert_matches!(
            unconfigured.verify_payment("o", "p", "00"),
            Err(ServiceError::ConfigurationError(_))
        );
        assert_matches!(
            unconfigured.verify_webhook(b"{}", Some("00")),
            Err(ServiceError::ConfigurationError(_))
        );
    }

    #[test]
    fn webhook_without_header_is_unauthorized() {
        assert_matches!(
            verifier().verify_webhook(b"{}", None),
            Err(ServiceError::Unauthorized(_))
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let rendered = format!("{:?}", verifier());
        assert!(!rendered.contains(KEY));
        assert!(!rendered.contains(WEBHOOK));
    }

    proptest! {
        #[test]
        fn any_single_byte_mutation_of_body_is_rejected(
            body in proptest::collection::vec(any::<u8>(), 1..256),
            index in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let sig = sign(WEBHOOK, &body);
            let mut tampered = body.clone();
            let i = index.index(tampered.len());
            tampered[i] ^= flip;
            prop_assert!(verifier().verify_webhook(&body, Some(&sig)).is_ok());
            prop_assert!(verifier().verify_webhook(&tampered, Some(&sig)).is_err());
        }

        #[test]
        fn any_single_byte_mutation_of_signature_is_rejected(
            body in proptest::collection::vec(any::<u8>(), 0..128),
            index in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let sig = sign(WEBHOOK, &body);
            let mut bytes = sig.clone().into_bytes();
            let i = index.index(bytes.len());
            bytes[i] ^= flip;
            let tampered = String::from_utf8_lossy(&bytes).into_owned();
            // Hex is case-insensitive, so a pure case flip encodes the same digest
            prop_assume!(!tampered.eq_ignore_ascii_case(&sig));
            prop_assert!(verifier().verify_webhook(&body, Some(&tampered)).is_err());
        }
    }
}
