//! PIN generation and verification.
//!
//! The PIN is a courtesy gate against accidental or unwanted transfers on a
//! shared LAN, not a credential against a determined attacker.

use rand::Rng;

/// Number of digits in a PIN.
pub const PIN_LEN: usize = 6;

/// Generate a random 6-digit PIN, zero-padded to fixed width.
pub fn generate_pin() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:06}", n)
}

/// Exact digit-string comparison.
///
/// Walks the full width of both strings instead of returning at the first
/// mismatching byte. Strings of unequal length never match.
pub fn verify_pin(presented: &str, expected: &str) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_pin_is_six_digits() {
        for _ in 0..100 {
            let pin = generate_pin();
            assert_eq!(pin.len(), PIN_LEN);
            assert!(pin.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn verify_is_exact_equality() {
        assert!(verify_pin("123456", "123456"));
        assert!(verify_pin("000000", "000000"));
        assert!(!verify_pin("123456", "123457"));
        assert!(!verify_pin("023456", "123456"));
        assert!(!verify_pin("000000", "123456"));
    }

    #[test]
    fn verify_rejects_length_mismatch() {
        assert!(!verify_pin("12345", "123456"));
        assert!(!verify_pin("1234567", "123456"));
        assert!(!verify_pin("", "123456"));
    }
}
