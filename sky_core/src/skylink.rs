//! Skylinks: fixed-size pointers to content on Skynet.
//!
//! A raw skylink is 34 bytes: a little-endian `u16` bitfield followed by a
//! 32-byte merkle root. The low two bits of the bitfield carry the version
//! (`0` for v1, `1` for v2). A v2 skylink points at a registry entry instead of
//! immutable content; its merkle root is the entry id derived from the owner's
//! public key and the entry's tweak.
//!
//! Text forms:
//! - base64 (URL-safe, unpadded, 46 chars) is the canonical form used in URLs
//!   and returned by `Display`;
//! - base32 (RFC 4648 extended hex alphabet, lower case, unpadded, 55 chars)
//!   is used for subdomains, since hostnames are case-insensitive.

use std::fmt;
use std::str::FromStr;

use data_encoding::{BASE32HEX_NOPAD, BASE64URL_NOPAD};
use url::Url;

use crate::Hash;
use crate::hash::hash_all;
use crate::keys::{PUBLIC_KEY_SIZE, PublicKeyEd25519};
use crate::registry::encode_prefixed_bytes;

/// The raw size in bytes of the data that gets put into a link.
pub const RAW_SKYLINK_SIZE: usize = 34;

/// The string length of the skylink after it has been encoded using base32.
pub const BASE32_ENCODED_SKYLINK_SIZE: usize = 55;

/// The string length of the skylink after it has been encoded using base64.
pub const BASE64_ENCODED_SKYLINK_SIZE: usize = 46;

/// URI scheme that may prefix a skylink.
pub const URI_SKYNET_PREFIX: &str = "sia://";

/// An all-zero raw skylink. Written as entry data to mark an entry deleted.
pub const EMPTY_SKYLINK: [u8; RAW_SKYLINK_SIZE] = [0u8; RAW_SKYLINK_SIZE];

const SPECIFIER_LEN: usize = 16;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SkylinkError {
    #[error("skylink has incorrect size: {0} characters")]
    IncorrectSize(usize),
    #[error("invalid length: expected {RAW_SKYLINK_SIZE} bytes, got {0}")]
    InvalidLength(usize),
    #[error("failed to load skylink data: {0}")]
    Decode(#[from] data_encoding::DecodeError),
    #[error("the {0} and {1} options cannot both be set")]
    ConflictingOptions(&'static str, &'static str),
}

/// Pointer to content (v1) or to a registry entry (v2).
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Skylink {
    pub bitfield: u16,
    pub merkle_root: [u8; 32],
}

impl fmt::Debug for Skylink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Skylink")
            .field("bitfield", &self.bitfield)
            .field("merkle_root", &hex::encode(self.merkle_root))
            .finish()
    }
}

impl Skylink {
    pub fn new(bitfield: u16, merkle_root: [u8; 32]) -> Self {
        Self {
            bitfield,
            merkle_root,
        }
    }

    /// Creates a v2 skylink for the registry entry owned by `public_key` under
    /// `tweak` (the hashed data key). Matches `NewSkylinkV2` in skyd.
    pub fn new_v2(public_key: &PublicKeyEd25519, tweak: &Hash) -> Self {
        let merkle_root = derive_registry_entry_id(&SiaPublicKey::ed25519(*public_key), tweak);
        Self::new(1, *merkle_root.as_bytes())
    }

    /// Loads a skylink from its 34 raw bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, SkylinkError> {
        if data.len() != RAW_SKYLINK_SIZE {
            return Err(SkylinkError::InvalidLength(data.len()));
        }
        let bitfield = u16::from_le_bytes([data[0], data[1]]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&data[2..]);
        Ok(Self::new(bitfield, merkle_root))
    }

    /// Parses a base64 or base32 skylink, optionally prefixed with `sia:`/`sia://`.
    pub fn parse(s: &str) -> Result<Self, SkylinkError> {
        let bytes = decode_skylink(s)?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; RAW_SKYLINK_SIZE] {
        let mut bytes = [0u8; RAW_SKYLINK_SIZE];
        bytes[..2].copy_from_slice(&self.bitfield.to_le_bytes());
        bytes[2..].copy_from_slice(&self.merkle_root);
        bytes
    }

    pub fn to_base64(&self) -> String {
        BASE64URL_NOPAD.encode(&self.to_bytes())
    }

    pub fn to_base32(&self) -> String {
        BASE32HEX_NOPAD.encode(&self.to_bytes()).to_ascii_lowercase()
    }

    pub fn is_v1(&self) -> bool {
        is_bitfield_v1(self.bitfield)
    }

    pub fn is_v2(&self) -> bool {
        is_bitfield_v2(self.bitfield)
    }

    /// True for the all-zero skylink used as the deletion marker.
    pub fn is_empty(&self) -> bool {
        self.to_bytes() == EMPTY_SKYLINK
    }
}

impl fmt::Display for Skylink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl FromStr for Skylink {
    type Err = SkylinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Skylink::parse(s)
    }
}

/// A v1 skylink uses version bits `0`; the other bits encode fetch offsets.
pub fn is_bitfield_v1(bitfield: u16) -> bool {
    bitfield & 3 == 0
}

/// A v2 skylink only uses the version bits, everything else must be zero.
pub fn is_bitfield_v2(bitfield: u16) -> bool {
    bitfield == 1
}

/// Decodes a base32 or base64 skylink string into its raw bytes, picking the
/// encoding by length.
pub fn decode_skylink(encoded: &str) -> Result<Vec<u8>, SkylinkError> {
    let encoded = trim_uri_prefix(encoded);
    let bytes = match encoded.len() {
        BASE32_ENCODED_SKYLINK_SIZE => {
            BASE32HEX_NOPAD.decode(encoded.to_ascii_uppercase().as_bytes())?
        }
        BASE64_ENCODED_SKYLINK_SIZE => {
            // Standard-alphabet links decode the same as their URL-safe form.
            let normalized = encoded.replace('+', "-").replace('/', "_");
            BASE64URL_NOPAD.decode(normalized.as_bytes())?
        }
        other => return Err(SkylinkError::IncorrectSize(other)),
    };
    if bytes.len() != RAW_SKYLINK_SIZE {
        return Err(SkylinkError::InvalidLength(bytes.len()));
    }
    Ok(bytes)
}

/// Converts a base64 skylink to base32.
pub fn convert_skylink_to_base32(skylink: &str) -> Result<String, SkylinkError> {
    let skylink = trim_uri_prefix(skylink);
    if skylink.len() != BASE64_ENCODED_SKYLINK_SIZE {
        return Err(SkylinkError::IncorrectSize(skylink.len()));
    }
    Ok(Skylink::parse(skylink)?.to_base32())
}

/// Converts a base32 skylink to base64.
pub fn convert_skylink_to_base64(skylink: &str) -> Result<String, SkylinkError> {
    let skylink = trim_uri_prefix(skylink);
    if skylink.len() != BASE32_ENCODED_SKYLINK_SIZE {
        return Err(SkylinkError::IncorrectSize(skylink.len()));
    }
    Ok(Skylink::parse(skylink)?.to_base64())
}

/// Adds the `sia://` prefix unless it is already there. Empty input stays empty.
pub fn format_skylink(skylink: &str) -> String {
    if skylink.is_empty() || skylink.starts_with(URI_SKYNET_PREFIX) {
        return skylink.to_owned();
    }
    format!("{URI_SKYNET_PREFIX}{skylink}")
}

fn trim_uri_prefix(s: &str) -> &str {
    s.strip_prefix(URI_SKYNET_PREFIX)
        .or_else(|| s.strip_prefix("sia:"))
        .unwrap_or(s)
}

/// Options for [`parse_skylink_url`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseSkylinkOptions {
    /// Look for a base32 skylink in the first label of the hostname.
    pub from_subdomain: bool,
    /// Return `skylink/path` instead of just the skylink.
    pub include_path: bool,
    /// Return only the path following the skylink.
    pub only_path: bool,
}

/// Extracts a skylink from a bare skylink, a `sia:` URI or a portal URL.
///
/// Returns `Ok(None)` when the input contains no skylink.
pub fn parse_skylink_url(
    input: &str,
    opts: ParseSkylinkOptions,
) -> Result<Option<String>, SkylinkError> {
    if opts.include_path && opts.only_path {
        return Err(SkylinkError::ConflictingOptions("includePath", "onlyPath"));
    }
    if opts.include_path && opts.from_subdomain {
        return Err(SkylinkError::ConflictingOptions(
            "includePath",
            "fromSubdomain",
        ));
    }

    if opts.from_subdomain {
        let Some(url) = parse_lenient_url(input) else {
            return Ok(None);
        };
        let Some(label) = url.host_str().and_then(|host| host.split('.').next()) else {
            return Ok(None);
        };
        if !is_skylink_chars(label, BASE32_ENCODED_SKYLINK_SIZE, false) {
            return Ok(None);
        }
        if opts.only_path {
            return Ok(Some(url.path().trim_end_matches('/').to_owned()));
        }
        return Ok(Some(label.to_owned()));
    }

    let input = trim_uri_prefix(input);
    if is_skylink_chars(input, BASE64_ENCODED_SKYLINK_SIZE, true) {
        if opts.only_path {
            return Ok(Some(String::new()));
        }
        return Ok(Some(input.to_owned()));
    }

    let Some(url) = parse_lenient_url(input) else {
        return Ok(None);
    };
    let path = url.path();
    let path = path.strip_suffix('/').unwrap_or(path);
    let path = path.strip_prefix('/').unwrap_or(path);
    let (skylink, rest) = match path.find('/') {
        Some(idx) => path.split_at(idx),
        None => (path, ""),
    };
    if !is_skylink_chars(skylink, BASE64_ENCODED_SKYLINK_SIZE, true) {
        return Ok(None);
    }
    if opts.include_path {
        Ok(Some(path.to_owned()))
    } else if opts.only_path {
        Ok(Some(rest.to_owned()))
    } else {
        Ok(Some(skylink.to_owned()))
    }
}

fn parse_lenient_url(input: &str) -> Option<Url> {
    match Url::parse(input) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{}", input.trim_start_matches('/'))).ok()
        }
        Err(_) => None,
    }
}

fn is_skylink_chars(s: &str, len: usize, allow_upper: bool) -> bool {
    s.len() == len
        && s.bytes().all(|b| {
            b.is_ascii_lowercase()
                || b.is_ascii_digit()
                || b == b'_'
                || b == b'-'
                || (allow_upper && b.is_ascii_uppercase())
        })
}

/// Sia specifier of ed25519 keys: the type name zero-padded to 16 bytes.
pub const SPECIFIER_ED25519: [u8; SPECIFIER_LEN] = *b"ed25519\0\0\0\0\0\0\0\0\0";

/// A public key tagged with its signature algorithm. Corresponds to
/// `types.SiaPublicKey` in skyd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiaPublicKey {
    pub algorithm: [u8; SPECIFIER_LEN],
    pub key: PublicKeyEd25519,
}

impl SiaPublicKey {
    pub fn ed25519(key: PublicKeyEd25519) -> Self {
        Self {
            algorithm: SPECIFIER_ED25519,
            key,
        }
    }

    /// `algorithm (16 bytes) || u64le(32) || key (32 bytes)`.
    pub fn marshal_sia(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SPECIFIER_LEN + 8 + PUBLIC_KEY_SIZE);
        bytes.extend_from_slice(&self.algorithm);
        bytes.extend_from_slice(&encode_prefixed_bytes(&self.key));
        bytes
    }
}

/// Entry id of a registry entry. Matches `DeriveRegistryEntryID` in skyd.
pub fn derive_registry_entry_id(public_key: &SiaPublicKey, tweak: &Hash) -> Hash {
    hash_all(&[&public_key.marshal_sia(), tweak.as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Skylink {
        let mut root = [0u8; 32];
        for (i, b) in root.iter_mut().enumerate() {
            *b = i as u8 * 7;
        }
        Skylink::new(4, root)
    }

    #[test]
    fn test_text_lengths() {
        let link = sample();
        assert_eq!(link.to_base64().len(), BASE64_ENCODED_SKYLINK_SIZE);
        assert_eq!(link.to_base32().len(), BASE32_ENCODED_SKYLINK_SIZE);
    }

    #[test]
    fn test_base64_and_base32_decode_to_same_link() {
        let link = sample();
        let from_b64 = Skylink::parse(&link.to_base64()).unwrap();
        let from_b32 = Skylink::parse(&link.to_base32()).unwrap();
        assert_eq!(from_b64, link);
        assert_eq!(from_b32, link);
        assert_eq!(from_b64.bitfield, from_b32.bitfield);
        assert_eq!(from_b64.merkle_root, from_b32.merkle_root);
    }

    #[test]
    fn test_bitfield_is_little_endian() {
        let link = Skylink::new(0x0102, [9u8; 32]);
        let bytes = link.to_bytes();
        assert_eq!(&bytes[..2], &[0x02, 0x01]);
        assert_eq!(Skylink::from_bytes(&bytes).unwrap(), link);
    }

    #[test]
    fn test_known_skylink() {
        let s = "XABvi7JtJbQSMAcDwnUnmp2FKDPjg8_tTTFP4BwMSxVdEg";
        let link: Skylink = s.parse().unwrap();
        assert_eq!(link.to_string(), s);
        assert!(link.is_v1());
        assert!(!link.is_v2());
    }

    #[test]
    fn test_uri_prefix_is_stripped() {
        let link = sample();
        let b64 = link.to_base64();
        assert_eq!(Skylink::parse(&format!("sia:{b64}")).unwrap(), link);
        assert_eq!(Skylink::parse(&format!("sia://{b64}")).unwrap(), link);
        assert_eq!(format_skylink(&b64), format!("sia://{b64}"));
        assert_eq!(format_skylink(&format_skylink(&b64)), format!("sia://{b64}"));
        assert_eq!(format_skylink(""), "");
    }

    #[test]
    fn test_incorrect_size() {
        assert_eq!(
            Skylink::parse("abc").unwrap_err(),
            SkylinkError::IncorrectSize(3)
        );
        assert_eq!(
            Skylink::from_bytes(&[0u8; 33]).unwrap_err(),
            SkylinkError::InvalidLength(33)
        );
    }

    #[test]
    fn test_invalid_characters_fail_decoding() {
        let bad = "!".repeat(BASE64_ENCODED_SKYLINK_SIZE);
        assert!(matches!(
            Skylink::parse(&bad),
            Err(SkylinkError::Decode(_))
        ));
    }

    #[test]
    fn test_standard_base64_alphabet_is_accepted() {
        let raw = [0xfbu8; RAW_SKYLINK_SIZE];
        let url_safe = BASE64URL_NOPAD.encode(&raw);
        assert!(url_safe.contains('-') && url_safe.contains('_'));
        let standard = url_safe.replace('-', "+").replace('_', "/");

        assert_eq!(decode_skylink(&url_safe).unwrap(), raw.to_vec());
        assert_eq!(decode_skylink(&standard).unwrap(), raw.to_vec());
    }

    #[test]
    fn test_version_bits() {
        assert!(is_bitfield_v1(0));
        assert!(is_bitfield_v1(4));
        assert!(!is_bitfield_v1(1));
        assert!(is_bitfield_v2(1));
        assert!(!is_bitfield_v2(5));
        assert!(!is_bitfield_v2(0));
    }

    #[test]
    fn test_v2_skylink() {
        let public_key = [3u8; 32];
        let tweak = Hash::new(b"tweak");
        let link = Skylink::new_v2(&public_key, &tweak);
        assert!(link.is_v2());
        assert_eq!(link, Skylink::new_v2(&public_key, &tweak));
        assert_ne!(link, Skylink::new_v2(&public_key, &Hash::new(b"other")));
    }

    #[test]
    fn test_marshal_sia_layout() {
        let key = SiaPublicKey::ed25519([5u8; 32]);
        let bytes = key.marshal_sia();
        assert_eq!(bytes.len(), 56);
        assert_eq!(&bytes[..7], b"ed25519");
        assert_eq!(&bytes[7..16], &[0u8; 9]);
        assert_eq!(&bytes[16..24], &32u64.to_le_bytes());
        assert_eq!(&bytes[24..], &[5u8; 32]);
        assert_eq!(key.algorithm, SPECIFIER_ED25519);
    }

    #[test]
    fn test_conversions() {
        let link = sample();
        let b32 = convert_skylink_to_base32(&link.to_base64()).unwrap();
        assert_eq!(b32, link.to_base32());
        let b64 = convert_skylink_to_base64(&b32).unwrap();
        assert_eq!(b64, link.to_base64());
        assert!(convert_skylink_to_base64(&link.to_base64()).is_err());
    }

    #[test]
    fn test_empty_skylink() {
        let empty = Skylink::from_bytes(&EMPTY_SKYLINK).unwrap();
        assert!(empty.is_empty());
        assert!(!sample().is_empty());
    }

    #[test]
    fn test_parse_skylink_url() {
        let s = "XABvi7JtJbQSMAcDwnUnmp2FKDPjg8_tTTFP4BwMSxVdEg";
        let opts = ParseSkylinkOptions::default();
        assert_eq!(parse_skylink_url(s, opts).unwrap().as_deref(), Some(s));
        assert_eq!(
            parse_skylink_url(&format!("sia://{s}"), opts).unwrap().as_deref(),
            Some(s)
        );
        assert_eq!(
            parse_skylink_url(&format!("https://siasky.net/{s}/foo/bar/"), opts)
                .unwrap()
                .as_deref(),
            Some(s)
        );
        let with_path = ParseSkylinkOptions {
            include_path: true,
            ..Default::default()
        };
        assert_eq!(
            parse_skylink_url(&format!("https://siasky.net/{s}/foo/bar"), with_path)
                .unwrap()
                .as_deref(),
            Some(format!("{s}/foo/bar").as_str())
        );
        let only_path = ParseSkylinkOptions {
            only_path: true,
            ..Default::default()
        };
        assert_eq!(
            parse_skylink_url(&format!("https://siasky.net/{s}/foo"), only_path)
                .unwrap()
                .as_deref(),
            Some("/foo")
        );
        assert_eq!(
            parse_skylink_url("https://siasky.net/not-a-skylink", opts).unwrap(),
            None
        );
    }

    #[test]
    fn test_parse_skylink_url_subdomain() {
        let link = sample();
        let b32 = link.to_base32();
        let opts = ParseSkylinkOptions {
            from_subdomain: true,
            ..Default::default()
        };
        assert_eq!(
            parse_skylink_url(&format!("https://{b32}.siasky.net/index.html"), opts)
                .unwrap()
                .as_deref(),
            Some(b32.as_str())
        );
        assert_eq!(
            parse_skylink_url("https://siasky.net", opts).unwrap(),
            None
        );
    }

    #[test]
    fn test_parse_skylink_url_conflicting_options() {
        let opts = ParseSkylinkOptions {
            include_path: true,
            only_path: true,
            from_subdomain: false,
        };
        assert!(parse_skylink_url("x", opts).is_err());
    }
}
