//! ---
//! warden_section: "06-security-access-control"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Credential token generation and secret digests."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use rand::distributions::Alphanumeric;
use rand::rngs::{OsRng, SmallRng};
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Generate a public lookup token from a fast, non-cryptographic source.
pub fn generate_key_id(length: usize) -> String {
    SmallRng::from_entropy()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Generate a secret from the operating system's secure source.
pub fn generate_secret(length: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// SHA-256 digest of a secret. The only form in which secrets are persisted.
pub fn secret_checksum(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

/// Compare digests in time independent of where they first differ.
pub fn checksums_match(stored: &[u8], presented: &[u8]) -> bool {
    stored.ct_eq(presented).into()
}

/// Short fingerprint of a digest for log lines.
pub fn fingerprint(checksum: &[u8]) -> String {
    hex::encode(&checksum[..checksum.len().min(4)])
}
