//! Callback signature verification.
//!
//! The provider signs `"{provider_order_id}|{payment_id}"` with
//! HMAC-SHA256 under the shared secret and sends the hex digest along
//! with the callback. Verification happens before the callback is
//! trusted; the comparison is constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies payment callback payloads.
pub struct CallbackSignature;

impl CallbackSignature {
    /// Computes the hex signature for a callback payload.
    pub fn sign(secret: &str, provider_order_id: &str, payment_id: &str) -> Result<String> {
        let mut mac = Self::mac(secret)?;
        mac.update(Self::payload(provider_order_id, payment_id).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Checks a hex signature against the callback payload.
    ///
    /// Anything short of an exact match is `SignatureMismatch`,
    /// including signatures that are not valid hex.
    pub fn verify(
        secret: &str,
        provider_order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<()> {
        let claimed = hex::decode(signature).map_err(|_| PaymentError::SignatureMismatch)?;
        let mut mac = Self::mac(secret)?;
        mac.update(Self::payload(provider_order_id, payment_id).as_bytes());
        mac.verify_slice(&claimed)
            .map_err(|_| PaymentError::SignatureMismatch)
    }

    fn mac(secret: &str) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| PaymentError::InvalidKey)
    }

    fn payload(provider_order_id: &str, payment_id: &str) -> String {
        format!("{provider_order_id}|{payment_id}")
    }
}
