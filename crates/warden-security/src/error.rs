//! ---
//! warden_section: "06-security-access-control"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Error taxonomy shared by the security components."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use std::error::Error as StdError;

/// Classification used by the transport to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    /// Malformed credential string.
    Format,
    NotFound,
    InvalidSecret,
    Expired,
    /// Expired because the sliding deadline passed.
    DeadlineExceeded,
    NotAuthorized,
    NoActiveIdentity,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// Credential failures that must surface as "unauthenticated".
    pub fn is_credential_failure(self) -> bool {
        matches!(
            self,
            ErrorKind::Format
                | ErrorKind::InvalidSecret
                | ErrorKind::Expired
                | ErrorKind::DeadlineExceeded
        )
    }

    pub fn is_expired(self) -> bool {
        matches!(self, ErrorKind::Expired | ErrorKind::DeadlineExceeded)
    }
}

/// Iterate an error and all of its sources, outermost first.
pub fn chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |&e| e.source())
}
