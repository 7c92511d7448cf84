//! Authenticates payment-completion callbacks.
//!
//! The gateway signs `order_id + "|" + payment_id` with HMAC-SHA256 under the
//! shared key secret and sends the lowercase hex digest. Verification is pure:
//! no I/O, no state, constant-time comparison.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::payment::PaymentCompletion;
use crate::CoreError;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `order_id|payment_id`.
pub fn sign(order_id: &str, payment_id: &str, secret: &str) -> String {
    // HMAC accepts keys of any length, including empty.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Returns false on any mismatch. Never panics.
pub fn verify(order_id: &str, payment_id: &str, signature: &str, secret: &str) -> bool {
    let expected = sign(order_id, payment_id, secret);
    if expected.is_empty() {
        return false;
    }
    constant_time_eq(&expected, signature)
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Holds the gateway secret. Construction fails on an empty secret so a
/// misconfigured deployment cannot fall back to a weak key.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Result<Self, CoreError> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(CoreError::ConfigurationError(
                "payment gateway secret is empty".to_string(),
            ));
        }
        Ok(Self { secret })
    }

    pub fn verify(&self, completion: &PaymentCompletion) -> bool {
        verify(
            &completion.order_id,
            &completion.payment_id,
            &completion.signature,
            &self.secret,
        )
    }

    pub fn sign(&self, order_id: &str, payment_id: &str) -> String {
        sign(order_id, payment_id, &self.secret)
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").field("secret", &"********").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_key";
    const ORDER: &str = "order_Abc123";
    const PAYMENT: &str = "pay_Xyz789";
    const EXPECTED: &str = "0c127a51e18ab36a32ab09172843dd5e63f994ae34ec5f19e9156e621939b25c";

    fn mutate(s: &str, at: usize) -> String {
        s.char_indices()
            .map(|(i, c)| if i == at { if c == 'a' { 'b' } else { 'a' } } else { c })
            .collect()
    }

    #[test]
    fn test_known_answer() {
        assert_eq!(sign(ORDER, PAYMENT, SECRET), EXPECTED);
        assert!(verify(ORDER, PAYMENT, EXPECTED, SECRET));
    }

    #[test]
    fn test_verify_is_pure() {
        let first = verify(ORDER, PAYMENT, EXPECTED, SECRET);
        let second = verify(ORDER, PAYMENT, EXPECTED, SECRET);
        assert_eq!(first, second);
        assert_eq!(sign(ORDER, PAYMENT, SECRET), sign(ORDER, PAYMENT, SECRET));
    }

    #[test]
    fn test_any_single_character_mutation_fails() {
        for i in 0..ORDER.len() {
            assert!(!verify(&mutate(ORDER, i), PAYMENT, EXPECTED, SECRET), "order pos {}", i);
        }
        for i in 0..PAYMENT.len() {
            assert!(!verify(ORDER, &mutate(PAYMENT, i), EXPECTED, SECRET), "payment pos {}", i);
        }
        for i in 0..EXPECTED.len() {
            assert!(!verify(ORDER, PAYMENT, &mutate(EXPECTED, i), SECRET), "signature pos {}", i);
        }
        for i in 0..SECRET.len() {
            assert!(!verify(ORDER, PAYMENT, EXPECTED, &mutate(SECRET, i)), "secret pos {}", i);
        }
    }

    #[test]
    fn test_truncated_or_uppercase_signature_fails() {
        assert!(!verify(ORDER, PAYMENT, &EXPECTED[..63], SECRET));
        assert!(!verify(ORDER, PAYMENT, "", SECRET));
        assert!(!verify(ORDER, PAYMENT, &EXPECTED.to_uppercase(), SECRET));
    }

    #[test]
    fn test_separator_is_part_of_message() {
        // "a|bc" and "ab|c" must not collide
        assert_ne!(sign("a", "bc", SECRET), sign("ab", "c", SECRET));
    }

    #[test]
    fn test_verifier_requires_secret() {
        assert!(SignatureVerifier::new("").is_err());
        assert!(SignatureVerifier::new("   ").is_err());

        let verifier = SignatureVerifier::new(SECRET).unwrap();
        let completion = PaymentCompletion {
            order_id: ORDER.to_string(),
            payment_id: PAYMENT.to_string(),
            signature: EXPECTED.to_string(),
        };
        assert!(verifier.verify(&completion));
        assert!(!format!("{:?}", verifier).contains(SECRET));
    }
}
