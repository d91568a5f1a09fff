//! ---
//! warden_section: "06-security-access-control"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Identifiers for principals, records and tenants."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

use rand::Rng;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

/// Errors raised when parsing identifiers from their textual form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    /// The numeric part is missing, zero, or not a number.
    #[error("invalid id {0:?}")]
    InvalidId(String),
    /// The polymorphic prefix is neither `i:` nor `g:`.
    #[error("invalid subject {0:?}, expected i:<id> or g:<id>")]
    InvalidSubject(String),
}

/// Non-zero record identifier. Rendered as a decimal string on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr,
)]
pub struct Uid(NonZeroU64);

impl Uid {
    /// Generate a fresh random identifier that fits in a signed 64-bit column.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let raw = rng.gen::<u64>() >> 1;
            if let Some(value) = NonZeroU64::new(raw) {
                return Self(value);
            }
        }
    }

    /// Wrap a raw value, returning `None` for zero.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Raw numeric value.
    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

impl Default for Uid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Uid {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .ok()
            .and_then(Self::from_raw)
            .ok_or_else(|| IdParseError::InvalidId(s.to_owned()))
    }
}

/// Tenant identifier. Every scoped store query filters on it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr,
)]
pub struct OrganizationId(Uid);

impl OrganizationId {
    pub fn new() -> Self {
        Self(Uid::new())
    }

    pub fn uid(&self) -> Uid {
        self.0
    }
}

impl Default for OrganizationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uid> for OrganizationId {
    fn from(value: Uid) -> Self {
        Self(value)
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OrganizationId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Subject of a grant: any principal kind, addressed uniformly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr,
)]
pub enum PolymorphicId {
    /// A user or machine identity.
    Identity(Uid),
    /// A group of identities.
    Group(Uid),
}

impl PolymorphicId {
    pub fn uid(&self) -> Uid {
        match self {
            PolymorphicId::Identity(id) | PolymorphicId::Group(id) => *id,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, PolymorphicId::Identity(_))
    }

    pub fn is_group(&self) -> bool {
        matches!(self, PolymorphicId::Group(_))
    }
}

impl fmt::Display for PolymorphicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolymorphicId::Identity(id) => write!(f, "i:{id}"),
            PolymorphicId::Group(id) => write!(f, "g:{id}"),
        }
    }
}

impl FromStr for PolymorphicId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IdParseError::InvalidSubject(s.to_owned());
        let (kind, id) = s.split_once(':').ok_or_else(invalid)?;
        let id: Uid = id.parse().map_err(|_| invalid())?;
        match kind {
            "i" => Ok(PolymorphicId::Identity(id)),
            "g" => Ok(PolymorphicId::Group(id)),
            _ => Err(invalid()),
        }
    }
}
