//! TW-003: Deterministic naming.
//!
//! `short_id` keeps generated resource names short and collision-resistant:
//! it is the first 8 hex chars of SHA-256 over the construct's full scope
//! path, so the same path always yields the same id.

use super::error::{SynthError, SynthResult};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// Length of a short id in hex characters.
pub const SHORT_ID_LEN: usize = 8;

/// Separator between scope path segments.
pub const PATH_SEPARATOR: &str = "/";

/// First 8 hex characters of SHA-256 over `input`.
pub fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(SHORT_ID_LEN);
    for byte in digest.iter().take(SHORT_ID_LEN / 2) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// Short id of a fully-qualified scope path.
pub fn short_id(path: &str) -> String {
    short_hash(path)
}

/// `base` suffixed with the short id, e.g. `StorageBucket1a2b3c4d`.
pub fn scoped_name(base: &str, short_id: &str) -> String {
    format!("{}{}", base, short_id)
}

/// A DNS-style alias unique to the construct, e.g. `1a2b3c4d.s3.local`.
pub fn scoped_host(base: &str, short_id: &str) -> String {
    format!("{}.{}", short_id, base)
}

/// Stable 32-bit hash of a string seed (djb2, xor variant, over UTF-16 code
/// units from the end).
pub fn seed_hash(seed: &str) -> u32 {
    let units: Vec<u16> = seed.encode_utf16().collect();
    let mut hash: u32 = 5381;
    for &unit in units.iter().rev() {
        hash = hash.wrapping_mul(33) ^ u32::from(unit);
    }
    hash
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("valid id pattern"))
}

/// Ids must be usable verbatim in service names and logical ids.
pub fn validate_id(id: &str) -> SynthResult<()> {
    if id_pattern().is_match(id) {
        Ok(())
    } else {
        Err(SynthError::InvalidId(id.to_string()))
    }
}

/// Express `target` relative to directory `base`. Both must be absolute or
/// both relative to the same root.
pub fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base: Vec<Component> = base.components().filter(|c| *c != Component::CurDir).collect();
    let target: Vec<Component> = target
        .components()
        .filter(|c| *c != Component::CurDir)
        .collect();

    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base.len() {
        out.push("..");
    }
    for c in &target[common..] {
        out.push(c.as_os_str());
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tw003_short_id_shape() {
        let id = short_id("MainStack/Postgres");
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_tw003_short_id_known_value() {
        // sha256("abc") = ba7816bf...
        assert_eq!(short_hash("abc"), "ba7816bf");
    }

    #[test]
    fn test_tw003_short_id_path_sensitive() {
        assert_ne!(short_id("A/Queue"), short_id("B/Queue"));
    }

    #[test]
    fn test_tw003_seed_hash_known_values() {
        assert_eq!(seed_hash(""), 5381);
        // 5381 * 33 ^ 'a'(97)
        assert_eq!(seed_hash("a"), (5381u32 * 33) ^ 97);
        // iterates from the last character
        let expected = ((5381u32 * 33) ^ u32::from(b'b')).wrapping_mul(33) ^ u32::from(b'a');
        assert_eq!(seed_hash("ab"), expected);
    }

    #[test]
    fn test_tw003_scoped_names() {
        assert_eq!(scoped_name("Bucket", "1a2b3c4d"), "Bucket1a2b3c4d");
        assert_eq!(scoped_host("s3.local", "1a2b3c4d"), "1a2b3c4d.s3.local");
    }

    #[test]
    fn test_tw003_validate_id() {
        assert!(validate_id("Postgres").is_ok());
        assert!(validate_id("queue-1.a_b").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("-lead").is_err());
    }

    #[test]
    fn test_tw003_relative_path() {
        let rel = relative_path(Path::new("/proj/docker"), Path::new("/proj/.postgres"));
        assert_eq!(rel, PathBuf::from("../.postgres"));
        let rel = relative_path(Path::new("/proj/docker"), Path::new("/proj/docker/data"));
        assert_eq!(rel, PathBuf::from("data"));
        let rel = relative_path(Path::new("/proj/docker"), Path::new("/proj/docker"));
        assert_eq!(rel, PathBuf::from("."));
    }

    proptest! {
        #[test]
        fn prop_tw003_short_id_pure(path in "[A-Za-z0-9/]{1,40}") {
            prop_assert_eq!(short_id(&path), short_id(&path));
            prop_assert_eq!(short_id(&path).len(), SHORT_ID_LEN);
        }
    }
}
