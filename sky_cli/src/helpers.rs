use anyhow::{Context, Result};
use sky_core::{DataKey, KeyPair, PublicKeyEd25519};

pub fn parse_public_key(s: &str) -> Result<PublicKeyEd25519> {
    sky_core::keys::parse_public_key(s.trim())
        .with_context(|| format!("invalid public key '{s}'"))
}

/// A raw data key, or with `hashed` a 64-character hex key used as is.
pub fn parse_data_key(s: &str, hashed: bool) -> Result<DataKey> {
    if hashed {
        DataKey::parse_hashed_hex(s.trim()).with_context(|| format!("invalid hashed data key '{s}'"))
    } else {
        Ok(DataKey::from(s))
    }
}

pub fn key_pair_from_seed(seed: &str) -> Result<KeyPair> {
    KeyPair::from_seed(seed).context("failed to derive key pair from seed")
}

pub fn parse_hex_data(s: &str) -> Result<Vec<u8>> {
    hex::decode(s.trim()).context("entry data must be hex encoded")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_public_key() {
        let keys = KeyPair::from_seed("cli").unwrap();
        let hex = keys.public_key_hex();
        assert_eq!(parse_public_key(&hex).unwrap(), keys.public_key());
        assert_eq!(
            parse_public_key(&format!("ed25519:{hex}")).unwrap(),
            keys.public_key()
        );
        assert!(parse_public_key("abcd").is_err());
    }

    #[test]
    fn test_parse_data_key() {
        assert_eq!(parse_data_key("app/key", false).unwrap(), DataKey::from("app/key"));
        let hashed = DataKey::from("app/key").hashed();
        assert_eq!(
            parse_data_key(&hashed.to_hex(), true).unwrap(),
            DataKey::Hashed(hashed)
        );
        assert!(parse_data_key("not hex", true).is_err());
    }
}
