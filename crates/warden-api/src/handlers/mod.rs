//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "API handlers and the shapes shared between them."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use warden_security::store::DEFAULT_PAGE_LIMIT;
use warden_security::{DataError, Pagination, RequestContext, Uid};

use crate::routes::ApiBuilder;

pub mod access_keys;
pub mod grants;
pub mod system;

pub fn register(api: &mut ApiBuilder) {
    system::register(api);
    access_keys::register(api);
    grants::register(api);
}

/// `page` and `limit` query parameters.
#[serde_as]
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub page: Option<usize>,
    #[serde(default)]
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub limit: Option<usize>,
}

impl PageQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(
            self.page.unwrap_or(1),
            self.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub count: usize,
    pub page: usize,
    pub limit: usize,
    pub total_count: usize,
    pub total_pages: usize,
}

impl<T> ListResponse<T> {
    pub fn new(items: Vec<T>, pagination: Pagination, total_count: usize) -> Self {
        Self {
            count: items.len(),
            items,
            page: pagination.page,
            limit: pagination.limit,
            total_count,
            total_pages: total_count.div_ceil(pagination.limit),
        }
    }
}

/// `:id` path parameter.
#[derive(Debug, Deserialize)]
pub struct ResourceId {
    pub id: Uid,
}

impl crate::routes::ApiRequest for ResourceId {}

/// Owner check: the caller is the identity `id`.
pub(crate) async fn is_self(ctx: RequestContext, id: Uid) -> Result<bool, DataError> {
    Ok(ctx.identity().map(|identity| identity.id) == Some(id))
}
