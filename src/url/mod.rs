//! URL handling
//!
//! Tracking-parameter normalization, canonical request fingerprints, domain
//! extraction and allowed-domain matching.

mod domain;
mod fingerprint;
mod matcher;
mod normalize;

pub use domain::extract_domain;
pub use fingerprint::{fingerprint, Fingerprint};
pub use matcher::{is_allowed_domain, matches_wildcard};
pub use normalize::{canonicalize_url, normalize_url, query_parameter, strip_tracking, TRACKING_PARAM};
