//! Shared-secret store for controlled admission.
//!
//! The password is never user-chosen: it is regenerated whenever the
//! listening endpoint opens and on explicit request, and handed out
//! only through the shareable connect command. Comparison is
//! byte-exact.

use rand::RngCore;
use std::fmt;

/// Bytes of entropy behind each generated password.
const PASSWORD_ENTROPY_BYTES: usize = 6;

/// The current shared secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Password {
    value: String,
}

impl Password {
    /// Generate a fresh password.
    #[must_use]
    pub fn generate() -> Self {
        let mut material = [0u8; PASSWORD_ENTROPY_BYTES];
        rand::thread_rng().fill_bytes(&mut material);
        Self {
            value: hex::encode(material),
        }
    }

    /// Replace the current value with a fresh one.
    pub fn rotate(&mut self) {
        *self = Self::generate();
    }

    /// String form, for the connect command.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Byte form, for the control-channel reply.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.value.as_bytes()
    }

    /// Whether `supplied` matches the current value, byte for byte.
    #[must_use]
    pub fn matches(&self, supplied: &[u8]) -> bool {
        supplied == self.value.as_bytes()
    }
}

impl Default for Password {
    fn default() -> Self {
        Self::generate()
    }
}

// Keeps the secret out of debug logs.
impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_produces_new_value() {
        let mut password = Password::generate();
        let before = password.as_str().to_string();
        password.rotate();
        assert_ne!(password.as_str(), before);
        assert!(!password.matches(before.as_bytes()));
    }

    #[test]
    fn test_match_is_byte_exact() {
        let password = Password::generate();
        assert!(password.matches(password.as_bytes()));
        assert!(!password.matches(password.as_str().to_uppercase().as_bytes()));
        assert!(!password.matches(b""));
    }

    #[test]
    fn test_generated_length() {
        let password = Password::generate();
        assert_eq!(password.as_str().len(), PASSWORD_ENTROPY_BYTES * 2);
    }

    #[test]
    fn test_debug_redacts_value() {
        let password = Password::generate();
        assert_eq!(format!("{password:?}"), "Password(..)");
    }
}
