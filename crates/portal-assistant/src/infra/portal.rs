//! Raw portal REST boundary.
//!
//! [`PortalClient`] mirrors the portal endpoints one method per call, with no
//! caching or pagination. Higher-level behavior lives in
//! [`crate::app::connection::PortalConnection`].

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

use crate::domain::item::{FolderInfo, ItemMetadata, UserProfile};

mod rest;

pub use rest::RestPortalClient;

/// Boxed async result used by [`PortalClient`] trait methods.
pub type PortalFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Failure reported by the portal or the transport underneath it.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum PortalError {
    /// The credential is missing, expired or was rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),
    /// The request never produced a usable HTTP response.
    #[error("Request to `{url}` failed: {message}")]
    Network { url: String, message: String },
    /// The portal answered with an error payload.
    #[error("Portal error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Failed to decode portal response: {0}")]
    Decode(String),
    #[error("Timed out after {0} seconds")]
    Timeout(u64),
}

/// Target and credential for one authenticated call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortalSession {
    /// Absolute REST root, for example `https://maps.arcgis.com/sharing/rest`.
    pub rest_url: String,
    pub token: Option<String>,
}

/// One page of a search request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchRequest {
    /// Filter expression, see [`crate::domain::query::SearchQuery`].
    pub query: String,
    /// 1-based index of the first record.
    pub start: u32,
    /// Number of records to return; `0` only reports `total`.
    pub num: u32,
    pub sort_field: Option<String>,
}

/// One page of search results.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage<T> {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub num: u32,
    #[serde(default)]
    pub next_start: i64,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

impl<T> SearchPage<T> {
    /// Builds a page holding `results` out of `total` matches.
    pub fn new(total: u32, results: Vec<T>) -> Self {
        Self {
            total,
            start: 1,
            num: u32::try_from(results.len()).unwrap_or(u32::MAX),
            next_start: -1,
            results,
        }
    }
}

/// OAuth authorization-code exchange request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenExchange {
    pub app_id: String,
    pub code: String,
    pub redirect_uri: String,
}

/// Access token granted by the portal.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
    pub username: String,
    pub refresh_token: Option<String>,
}

/// Item creation request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddItemRequest {
    pub owner: String,
    pub folder_id: Option<String>,
    pub item: ItemMetadata,
    /// Serialized item payload.
    pub text: String,
}

/// Item payload update request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpdateItemRequest {
    pub owner: String,
    pub item_id: String,
    pub text: String,
}

/// Item removal request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeleteItemRequest {
    pub owner: String,
    pub item_id: String,
}

/// Low-level async portal boundary used by connection orchestration code.
///
/// Production uses [`RestPortalClient`], while tests inject
/// `MockPortalClient` to script portal responses.
#[cfg_attr(test, mockall::automock)]
pub trait PortalClient: Send + Sync {
    /// Exchanges an OAuth authorization code for an access token.
    ///
    /// # Errors
    /// Returns [`PortalError::Authentication`] when the code is rejected.
    fn exchange_code(
        &self,
        rest_url: String,
        exchange: TokenExchange,
    ) -> PortalFuture<Result<TokenGrant, PortalError>>;

    /// Returns the profile of the user owning the session token.
    fn get_self(&self, session: PortalSession) -> PortalFuture<Result<UserProfile, PortalError>>;

    /// Returns the public profile of `username`, including group membership.
    fn get_user(
        &self,
        session: PortalSession,
        username: String,
    ) -> PortalFuture<Result<UserProfile, PortalError>>;

    /// Lists the content folders owned by `username`.
    fn user_folders(
        &self,
        session: PortalSession,
        username: String,
    ) -> PortalFuture<Result<Vec<FolderInfo>, PortalError>>;

    /// Runs one page of an item search.
    fn search_items(
        &self,
        session: PortalSession,
        request: SearchRequest,
    ) -> PortalFuture<Result<SearchPage<ItemMetadata>, PortalError>>;

    /// Runs one page of a user search.
    fn search_users(
        &self,
        session: PortalSession,
        request: SearchRequest,
    ) -> PortalFuture<Result<SearchPage<UserProfile>, PortalError>>;

    /// Returns item metadata.
    fn get_item(
        &self,
        session: PortalSession,
        item_id: String,
    ) -> PortalFuture<Result<ItemMetadata, PortalError>>;

    /// Returns the raw item payload text. Items without data yield an empty
    /// string.
    fn get_item_data(
        &self,
        session: PortalSession,
        item_id: String,
    ) -> PortalFuture<Result<String, PortalError>>;

    /// Creates an item and returns its id.
    fn add_item(
        &self,
        session: PortalSession,
        request: AddItemRequest,
    ) -> PortalFuture<Result<String, PortalError>>;

    /// Replaces an item payload.
    fn update_item(
        &self,
        session: PortalSession,
        request: UpdateItemRequest,
    ) -> PortalFuture<Result<(), PortalError>>;

    /// Removes an item.
    fn delete_item(
        &self,
        session: PortalSession,
        request: DeleteItemRequest,
    ) -> PortalFuture<Result<(), PortalError>>;
}
