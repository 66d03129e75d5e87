use regex::Regex;
use std::sync::OnceLock;

use crate::error::Error;

/// Length of a decoded ledger public key
const PUBKEY_BYTES: usize = 32;

/// Syntactic pre-check for balance keys
pub trait KeyValidator: Send + Sync {
    fn validate(&self, key: &str) -> Result<(), Error>;

    fn is_valid(&self, key: &str) -> bool {
        self.validate(key).is_ok()
    }
}

/// Accepts base58 strings that decode to a 32-byte public key
#[derive(Debug, Default, Clone, Copy)]
pub struct WalletAddressValidator;

fn base58_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("base58 pattern is valid")
    })
}

impl KeyValidator for WalletAddressValidator {
    fn validate(&self, key: &str) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::InvalidKey("address cannot be empty".to_string()));
        }

        if !base58_pattern().is_match(key) {
            return Err(Error::InvalidKey(
                "must be 32 to 44 base58 characters".to_string(),
            ));
        }

        let decoded = bs58::decode(key)
            .into_vec()
            .map_err(|e| Error::InvalidKey(format!("not valid base58: {}", e)))?;

        if decoded.len() != PUBKEY_BYTES {
            return Err(Error::InvalidKey(format!(
                "decodes to {} bytes, expected {}",
                decoded.len(),
                PUBKEY_BYTES
            )));
        }

        Ok(())
    }
}

/// Accepts every key. Useful when callers already validated upstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl KeyValidator for AcceptAll {
    fn validate(&self, _key: &str) -> Result<(), Error> {
        Ok(())
    }
}
