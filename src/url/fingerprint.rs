//! Request fingerprints
//!
//! A fingerprint is the stable identity of a request. The frontier's seen-set
//! and the response cache both key on it, so this is the only place where
//! request identity is computed.

use crate::url::normalize::{canonicalize_url, strip_tracking};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Hex-encoded SHA-256 identity of a request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Returns the full hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the two-character prefix used to bound directory fan-out
    pub fn prefix(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the fingerprint of a request from its method, URL and body
///
/// The URL has the tracking parameter stripped and is then canonicalized, so
/// two requests that differ only in `snr` (or in query order or fragment)
/// share a fingerprint. Cookies and headers are not part of the identity.
pub fn fingerprint(method: &str, url: &Url, body: &[u8]) -> Fingerprint {
    let canonical = canonicalize_url(&strip_tracking(url));

    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(body);

    Fingerprint(hex::encode(hasher.finalize()))
}
