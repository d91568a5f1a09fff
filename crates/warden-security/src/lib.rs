//! ---
//! warden_section: "06-security-access-control"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Access keys, grant authorization, request context and store adapter."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
pub mod access;
pub mod access_key;
pub mod bootstrap;
pub mod context;
pub mod crypto;
pub mod error;
pub mod grants;
pub mod models;
pub mod store;
pub mod uid;
pub mod validate;

pub use access::{
    can, handle_auth_err, has_authorization, is_not_authorized, require_infra_role, AccessError,
    AuthorizationError, RESOURCE_WARDEN_API, ROLE_ADMIN, ROLE_CONNECTOR, ROLE_VIEW,
};
pub use access_key::{
    AccessKeyError, AccessKeys, DeleteAccessKeys, IssuedAccessKey, ListAccessKeys, NewAccessKey,
    KEY_ID_LENGTH, SECRET_LENGTH,
};
pub use bootstrap::{BootstrapError, BootstrapSummary};
pub use context::{Authenticated, RequestContext, SharedTransaction, TxnGuard};
pub use error::ErrorKind;
pub use grants::{GrantError, Grants, ListGrants, NewGrant};
pub use models::{AccessKey, Grant, Group, Identity, Organization, Provider, ProviderKind};
pub use store::{DataError, MemoryStore, Page, Pagination, Store, StoreResult, Transaction};
pub use uid::{IdParseError, OrganizationId, PolymorphicId, Uid};
pub use validate::{FieldError, ValidationError};
