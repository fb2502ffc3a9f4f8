//! Callback signatures: hex HMAC-SHA256 over `order_id|payment_id`.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &SecretString, order_id: &str, payment_id: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes()).ok()?;
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    Some(mac)
}

/// Computes the signature the gateway sends for a payment.
pub fn sign(secret: &SecretString, order_id: &str, payment_id: &str) -> String {
    mac(secret, order_id, payment_id)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

/// Checks a callback signature in constant time.
pub fn verify(secret: &SecretString, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    mac(secret, order_id, payment_id).is_some_and(|mac| mac.verify_slice(&expected).is_ok())
}
