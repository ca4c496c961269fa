//! Authenticated handle to one remote portal.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::Shared;
use tracing::{debug, info};

use crate::app::paging::query_all;
use crate::domain::connection::ConnectionConfig;
use crate::domain::item::{
    FolderInfo, GroupInfo, ItemContent, ItemMetadata, PortalItemData, UserProfile,
};
use crate::domain::query::SearchQuery;
use crate::infra::auth::{AuthRequest, Authenticator, Credential};
use crate::infra::portal::{
    AddItemRequest, DeleteItemRequest, PortalClient, PortalError, PortalFuture, SearchRequest,
    UpdateItemRequest,
};

/// Sign-in attempt shared by every concurrent caller.
type PendingCredential = Shared<PortalFuture<Result<Credential, PortalError>>>;

const ROOT_FOLDER: &str = "root";

/// Builds the filter matching every item stored in `folder_id`.
pub fn folder_items_query(folder_id: &str) -> SearchQuery {
    SearchQuery::new().term(folder_id).in_field("ownerfolder")
}

/// One configured portal with a lazily acquired, cached credential.
pub struct PortalConnection {
    authenticator: Arc<dyn Authenticator>,
    client: Arc<dyn PortalClient>,
    config: ConnectionConfig,
    credential: Mutex<Option<PendingCredential>>,
}

impl PortalConnection {
    pub fn new(
        config: ConnectionConfig,
        client: Arc<dyn PortalClient>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            authenticator,
            client,
            config,
            credential: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Returns the portal base URL.
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Returns the portal host name used as the virtual directory name.
    pub fn portal_name(&self) -> String {
        self.config.portal_name()
    }

    /// Signs in, reusing the cached credential or the attempt already in
    /// flight.
    ///
    /// At most one sign-in request is outstanding per connection. A failed
    /// attempt is forgotten so the next call starts a new one.
    ///
    /// # Errors
    /// Returns the sign-in error to every caller that shared the attempt.
    pub async fn authenticate(&self) -> Result<Credential, PortalError> {
        let pending = self.pending_credential();
        let result = pending.clone().await;
        if result.is_err() {
            self.forget_credential(&pending);
        }

        result
    }

    /// Lists the content folders of `username`, or of the signed-in user.
    ///
    /// # Errors
    /// Returns sign-in and request errors.
    pub async fn list_folders(
        &self,
        username: Option<String>,
    ) -> Result<Vec<FolderInfo>, PortalError> {
        let credential = self.authenticate().await?;
        let username = username.unwrap_or_else(|| credential.username.clone());

        self.client
            .user_folders(credential.session(&self.config.rest_url()), username)
            .await
    }

    /// Lists every item matching `query`, deduplicated by id and sorted by
    /// title.
    ///
    /// Without a query the signed-in user's root-folder items are listed.
    /// `page_size` defaults to the connection paging settings.
    ///
    /// # Errors
    /// Returns sign-in errors and a failed total probe. Failed pages are
    /// skipped.
    pub async fn list_items(
        &self,
        query: Option<SearchQuery>,
        page_size: Option<u32>,
    ) -> Result<Vec<ItemMetadata>, PortalError> {
        let credential = self.authenticate().await?;
        let query = query
            .unwrap_or_else(|| default_item_query(&credential))
            .to_string();
        let session = credential.session(&self.config.rest_url());
        let page_size = page_size.unwrap_or(self.config.paging.page_size);
        debug!(portal = %self.portal_name(), query, page_size, "Listing items");

        let items = query_all(self.config.paging.start, page_size, |start, num| {
            self.client.search_items(
                session.clone(),
                SearchRequest {
                    query: query.clone(),
                    start,
                    num,
                    sort_field: Some("title".to_string()),
                },
            )
        })
        .await?;

        let mut items = unique_by(items, |item| item.id.clone());
        items.sort_by(|left, right| left.title.cmp(&right.title));

        Ok(items)
    }

    /// Lists every user matching `query`, sorted by username.
    ///
    /// Without a query the signed-in user's organization is listed.
    ///
    /// # Errors
    /// Returns sign-in errors and a failed total probe.
    pub async fn list_users(
        &self,
        query: Option<SearchQuery>,
    ) -> Result<Vec<UserProfile>, PortalError> {
        let credential = self.authenticate().await?;
        let query = query
            .unwrap_or_else(|| org_query(&credential))
            .to_string();
        let session = credential.session(&self.config.rest_url());

        let users = query_all(
            self.config.paging.start,
            self.config.paging.page_size,
            |start, num| {
                self.client.search_users(
                    session.clone(),
                    SearchRequest {
                        query: query.clone(),
                        start,
                        num,
                        sort_field: Some("username".to_string()),
                    },
                )
            },
        )
        .await?;

        let mut users = unique_by(users, |user| user.username.clone());
        users.sort_by(|left, right| left.username.cmp(&right.username));

        Ok(users)
    }

    /// Lists the groups of the signed-in user, sorted by title.
    ///
    /// # Errors
    /// Returns sign-in and request errors.
    pub async fn list_groups(&self) -> Result<Vec<GroupInfo>, PortalError> {
        let credential = self.authenticate().await?;
        let profile = self
            .client
            .get_user(
                credential.session(&self.config.rest_url()),
                credential.username.clone(),
            )
            .await?;

        let mut groups = profile.groups;
        groups.sort_by(|left, right| left.title.cmp(&right.title));

        Ok(groups)
    }

    /// Fetches item metadata and payload.
    ///
    /// # Errors
    /// Returns sign-in errors and [`PortalError::NotFound`] for unknown ids.
    pub async fn fetch_item(&self, item_id: &str) -> Result<PortalItemData, PortalError> {
        let credential = self.authenticate().await?;
        let session = credential.session(&self.config.rest_url());
        let (item, raw) = futures::try_join!(
            self.client.get_item(session.clone(), item_id.to_string()),
            self.client.get_item_data(session, item_id.to_string()),
        )?;

        Ok(PortalItemData::new(item, raw))
    }

    /// Creates an item in `folder_id` (or the root folder) of `owner` (or the
    /// signed-in user) and returns the new id.
    ///
    /// # Errors
    /// Returns sign-in and request errors.
    pub async fn create_item(
        &self,
        item: ItemMetadata,
        content: &ItemContent,
        folder_id: Option<String>,
        owner: Option<String>,
    ) -> Result<String, PortalError> {
        let credential = self.authenticate().await?;
        let owner = owner.unwrap_or_else(|| credential.username.clone());
        let title = item.title.clone();
        let item_id = self
            .client
            .add_item(
                credential.session(&self.config.rest_url()),
                AddItemRequest {
                    owner,
                    folder_id,
                    item,
                    text: content.to_upload_text(),
                },
            )
            .await?;
        info!(portal = %self.portal_name(), item_id, title, "Created item");

        Ok(item_id)
    }

    /// Replaces the payload of an item owned by the signed-in user.
    ///
    /// # Errors
    /// Returns sign-in and request errors.
    pub async fn update_item(
        &self,
        item_id: &str,
        content: &ItemContent,
    ) -> Result<(), PortalError> {
        let credential = self.authenticate().await?;
        self.client
            .update_item(
                credential.session(&self.config.rest_url()),
                UpdateItemRequest {
                    owner: credential.username.clone(),
                    item_id: item_id.to_string(),
                    text: content.to_upload_text(),
                },
            )
            .await?;
        info!(portal = %self.portal_name(), item_id, "Updated item");

        Ok(())
    }

    /// Removes an item owned by `owner` (or the signed-in user).
    ///
    /// # Errors
    /// Returns sign-in and request errors.
    pub async fn delete_item(
        &self,
        item_id: &str,
        owner: Option<String>,
    ) -> Result<(), PortalError> {
        let credential = self.authenticate().await?;
        let owner = owner.unwrap_or_else(|| credential.username.clone());
        self.client
            .delete_item(
                credential.session(&self.config.rest_url()),
                DeleteItemRequest {
                    owner,
                    item_id: item_id.to_string(),
                },
            )
            .await?;
        info!(portal = %self.portal_name(), item_id, "Deleted item");

        Ok(())
    }

    fn pending_credential(&self) -> PendingCredential {
        let mut slot = self
            .credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = slot.as_ref() {
            return pending.clone();
        }

        debug!(portal = %self.portal_name(), "Starting sign-in");
        let pending = self
            .authenticator
            .authenticate(AuthRequest {
                rest_url: self.config.rest_url(),
                app_id: self.config.app_id.clone(),
            })
            .shared();
        *slot = Some(pending.clone());

        pending
    }

    fn forget_credential(&self, failed: &PendingCredential) {
        let mut slot = self
            .credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot
            .as_ref()
            .is_some_and(|pending| pending.ptr_eq(failed))
        {
            *slot = None;
        }
    }
}

fn org_query(credential: &Credential) -> SearchQuery {
    SearchQuery::new()
        .term(credential.org_id.as_deref().unwrap_or_default())
        .in_field("orgid")
}

fn default_item_query(credential: &Credential) -> SearchQuery {
    org_query(credential)
        .and()
        .term(ROOT_FOLDER)
        .in_field("ownerfolder")
        .and()
        .term(&credential.username)
        .in_field("owner")
}

/// Keeps the first occurrence of every key, preserving order.
fn unique_by<T>(values: Vec<T>, key: impl Fn(&T) -> String) -> Vec<T> {
    let mut seen = HashSet::new();

    values
        .into_iter()
        .filter(|value| seen.insert(key(value)))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures for tests that need signed-in connections.

    use super::*;
    use crate::infra::auth::MockAuthenticator;
    use crate::infra::portal::MockPortalClient;

    pub(crate) fn credential() -> Credential {
        Credential {
            token: "token-1".to_string(),
            username: "jsmith".to_string(),
            org_id: Some("org-1".to_string()),
        }
    }

    /// Authenticator that signs in immediately, any number of times.
    pub(crate) fn signed_in_authenticator() -> MockAuthenticator {
        let mut authenticator = MockAuthenticator::new();
        authenticator
            .expect_authenticate()
            .returning(|_| Box::pin(async { Ok(credential()) }));

        authenticator
    }

    pub(crate) fn connection_with(
        endpoint: &str,
        client: MockPortalClient,
    ) -> Arc<PortalConnection> {
        Arc::new(PortalConnection::new(
            ConnectionConfig::new(endpoint),
            Arc::new(client),
            Arc::new(signed_in_authenticator()),
        ))
    }

    pub(crate) fn item(id: &str, title: &str) -> ItemMetadata {
        ItemMetadata {
            id: id.to_string(),
            title: title.to_string(),
            item_type: "Web Map".to_string(),
            owner: "jsmith".to_string(),
            ..ItemMetadata::default()
        }
    }
}
