//! Per-boot session token
//!
//! The provisioning page carries this token in a hidden field. A submission
//! is only applied when it echoes the token of the current server run, so a
//! form cached by the browser before a reboot cannot overwrite the
//! configuration again.

use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;

/// Number of hex digits in a token
pub const TOKEN_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    value: String,
}

impl SessionToken {
    /// Draw a fresh token from the OS random source
    pub fn generate() -> Self {
        Self::from_bits(OsRng.next_u64())
    }

    /// Encode 64 bits as a fixed-width token
    pub fn from_bits(bits: u64) -> Self {
        SessionToken {
            value: format!("{:016x}", bits),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Exact comparison against a submitted value
    pub fn matches(&self, candidate: Option<&str>) -> bool {
        candidate == Some(self.value.as_str())
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_hex() {
        let token = SessionToken::from_bits(0xab);
        assert_eq!(token.as_str(), "00000000000000ab");

        let token = SessionToken::generate();
        assert_eq!(token.as_str().len(), TOKEN_LEN);
        assert!(token.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tokens_differ() {
        assert_ne!(SessionToken::generate(), SessionToken::generate());
    }

    #[test]
    fn test_matches_exactly() {
        let token = SessionToken::from_bits(0xdead_beef);
        assert!(token.matches(Some("00000000deadbeef")));
        assert!(!token.matches(Some("00000000DEADBEEF")));
        assert!(!token.matches(Some("deadbeef")));
        assert!(!token.matches(Some("")));
        assert!(!token.matches(None));
    }
}
