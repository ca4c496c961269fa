//! `reqwest`-backed [`PortalClient`] implementation.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::{
    AddItemRequest, DeleteItemRequest, PortalClient, PortalError, PortalFuture, PortalSession,
    SearchPage, SearchRequest, TokenExchange, TokenGrant, UpdateItemRequest,
};
use crate::domain::item::{FolderInfo, ItemMetadata, UserProfile};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const RESPONSE_FORMAT: &str = "json";
/// Portal error codes for invalid or expired tokens.
const TOKEN_ERROR_CODES: [i64; 2] = [498, 499];

type Params = Vec<(&'static str, String)>;

#[derive(Deserialize)]
struct UserContentResponse {
    #[serde(default)]
    folders: Vec<FolderInfo>,
}

#[derive(Deserialize)]
struct AddItemResponse {
    id: String,
}

/// Portal client talking to the public REST API over HTTPS.
#[derive(Clone)]
pub struct RestPortalClient {
    http: Client,
}

impl Default for RestPortalClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RestPortalClient {
    /// Creates a client with a per-request timeout.
    pub fn new() -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { http }
    }
}

impl PortalClient for RestPortalClient {
    fn exchange_code(
        &self,
        rest_url: String,
        exchange: TokenExchange,
    ) -> PortalFuture<Result<TokenGrant, PortalError>> {
        let http = self.http.clone();

        Box::pin(async move {
            let url = format!("{rest_url}/oauth2/token");
            let params = vec![
                ("client_id", exchange.app_id),
                ("grant_type", "authorization_code".to_string()),
                ("code", exchange.code),
                ("redirect_uri", exchange.redirect_uri),
                ("f", RESPONSE_FORMAT.to_string()),
            ];
            let text = send(http.post(&url).form(&params), &url).await?;

            decode::<TokenGrant>(&text).map_err(|error| match error {
                PortalError::Remote { message, .. } => PortalError::Authentication(message),
                other => other,
            })
        })
    }

    fn get_self(&self, session: PortalSession) -> PortalFuture<Result<UserProfile, PortalError>> {
        let http = self.http.clone();

        Box::pin(async move {
            let url = format!("{}/community/self", session.rest_url);

            get_json(&http, &url, &session, Vec::new()).await
        })
    }

    fn get_user(
        &self,
        session: PortalSession,
        username: String,
    ) -> PortalFuture<Result<UserProfile, PortalError>> {
        let http = self.http.clone();

        Box::pin(async move {
            let url = format!("{}/community/users/{username}", session.rest_url);

            get_json(&http, &url, &session, Vec::new()).await
        })
    }

    fn user_folders(
        &self,
        session: PortalSession,
        username: String,
    ) -> PortalFuture<Result<Vec<FolderInfo>, PortalError>> {
        let http = self.http.clone();

        Box::pin(async move {
            let url = format!("{}/content/users/{username}", session.rest_url);
            let response: UserContentResponse = get_json(&http, &url, &session, Vec::new()).await?;

            Ok(response.folders)
        })
    }

    fn search_items(
        &self,
        session: PortalSession,
        request: SearchRequest,
    ) -> PortalFuture<Result<SearchPage<ItemMetadata>, PortalError>> {
        let http = self.http.clone();

        Box::pin(async move {
            let url = format!("{}/search", session.rest_url);

            get_json(&http, &url, &session, search_params(request)).await
        })
    }

    fn search_users(
        &self,
        session: PortalSession,
        request: SearchRequest,
    ) -> PortalFuture<Result<SearchPage<UserProfile>, PortalError>> {
        let http = self.http.clone();

        Box::pin(async move {
            let url = format!("{}/community/users", session.rest_url);

            get_json(&http, &url, &session, search_params(request)).await
        })
    }

    fn get_item(
        &self,
        session: PortalSession,
        item_id: String,
    ) -> PortalFuture<Result<ItemMetadata, PortalError>> {
        let http = self.http.clone();

        Box::pin(async move {
            let url = format!("{}/content/items/{item_id}", session.rest_url);

            get_json(&http, &url, &session, Vec::new()).await
        })
    }

    fn get_item_data(
        &self,
        session: PortalSession,
        item_id: String,
    ) -> PortalFuture<Result<String, PortalError>> {
        let http = self.http.clone();

        Box::pin(async move {
            let url = format!("{}/content/items/{item_id}/data", session.rest_url);
            let params = auth_params(&session, Vec::new());
            let text = send(http.get(&url).query(&params), &url).await?;
            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                check_portal_error(&value)?;
            }

            Ok(text)
        })
    }

    fn add_item(
        &self,
        session: PortalSession,
        request: AddItemRequest,
    ) -> PortalFuture<Result<String, PortalError>> {
        let http = self.http.clone();

        Box::pin(async move {
            let url = format!(
                "{}/{}",
                session.rest_url,
                add_item_path(&request.owner, request.folder_id.as_deref())
            );
            let response: AddItemResponse =
                post_form(&http, &url, &session, add_item_params(&request)).await?;

            Ok(response.id)
        })
    }

    fn update_item(
        &self,
        session: PortalSession,
        request: UpdateItemRequest,
    ) -> PortalFuture<Result<(), PortalError>> {
        let http = self.http.clone();

        Box::pin(async move {
            let url = format!(
                "{}/content/users/{}/items/{}/update",
                session.rest_url, request.owner, request.item_id
            );
            let _: Value = post_form(&http, &url, &session, vec![("text", request.text)]).await?;

            Ok(())
        })
    }

    fn delete_item(
        &self,
        session: PortalSession,
        request: DeleteItemRequest,
    ) -> PortalFuture<Result<(), PortalError>> {
        let http = self.http.clone();

        Box::pin(async move {
            let url = format!(
                "{}/content/users/{}/items/{}/delete",
                session.rest_url, request.owner, request.item_id
            );
            let _: Value = post_form(&http, &url, &session, Vec::new()).await?;

            Ok(())
        })
    }
}

async fn get_json<T: DeserializeOwned>(
    http: &Client,
    url: &str,
    session: &PortalSession,
    params: Params,
) -> Result<T, PortalError> {
    let params = auth_params(session, params);
    let text = send(http.get(url).query(&params), url).await?;

    decode(&text)
}

async fn post_form<T: DeserializeOwned>(
    http: &Client,
    url: &str,
    session: &PortalSession,
    params: Params,
) -> Result<T, PortalError> {
    let params = auth_params(session, params);
    let text = send(http.post(url).form(&params), url).await?;

    decode(&text)
}

async fn send(request: RequestBuilder, url: &str) -> Result<String, PortalError> {
    debug!(url, "Sending portal request");
    let response = request.send().await.map_err(|error| PortalError::Network {
        url: url.to_string(),
        message: error.to_string(),
    })?;

    match response.status() {
        status if status.is_success() => {}
        StatusCode::NOT_FOUND => return Err(PortalError::NotFound(url.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(PortalError::Authentication(format!(
                "`{url}` rejected the credential"
            )));
        }
        status => {
            return Err(PortalError::Network {
                url: url.to_string(),
                message: format!("HTTP {status}"),
            });
        }
    }

    response.text().await.map_err(|error| PortalError::Network {
        url: url.to_string(),
        message: error.to_string(),
    })
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T, PortalError> {
    let value: Value =
        serde_json::from_str(text).map_err(|error| PortalError::Decode(error.to_string()))?;
    check_portal_error(&value)?;

    serde_json::from_value(value).map_err(|error| PortalError::Decode(error.to_string()))
}

/// Converts the portal's in-band `{"error": {...}}` payload into a typed
/// error. The portal reports most failures with HTTP 200.
fn check_portal_error(value: &Value) -> Result<(), PortalError> {
    let Some(error) = value.get("error").filter(|error| error.is_object()) else {
        return Ok(());
    };
    let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("Unknown portal error")
        .to_string();

    Err(match code {
        code if TOKEN_ERROR_CODES.contains(&code) => PortalError::Authentication(message),
        404 => PortalError::NotFound(message),
        400 if message.contains("does not exist") => PortalError::NotFound(message),
        code => PortalError::Remote { code, message },
    })
}

fn auth_params(session: &PortalSession, mut params: Params) -> Params {
    params.push(("f", RESPONSE_FORMAT.to_string()));
    if let Some(token) = &session.token {
        params.push(("token", token.clone()));
    }

    params
}

fn search_params(request: SearchRequest) -> Params {
    let mut params = vec![
        ("q", request.query),
        ("start", request.start.to_string()),
        ("num", request.num.to_string()),
    ];
    if let Some(sort_field) = request.sort_field {
        params.push(("sortField", sort_field));
    }

    params
}

fn add_item_path(owner: &str, folder_id: Option<&str>) -> String {
    match folder_id {
        Some(folder_id) if !folder_id.is_empty() => {
            format!("content/users/{owner}/{folder_id}/addItem")
        }
        _ => format!("content/users/{owner}/addItem"),
    }
}

fn add_item_params(request: &AddItemRequest) -> Params {
    let item = &request.item;
    let mut params = vec![
        ("title", item.title.clone()),
        ("type", item.item_type.clone()),
        ("typeKeywords", item.type_keywords.join(",")),
        ("tags", item.tags.join(",")),
        ("text", request.text.clone()),
    ];
    let optional_fields = [
        ("description", &item.description),
        ("snippet", &item.snippet),
        ("url", &item.url),
    ];
    for (name, value) in optional_fields {
        if let Some(value) = value {
            params.push((name, value.clone()));
        }
    }

    params
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_check_portal_error_maps_token_codes_to_authentication() {
        // Arrange
        let payload = json!({"error": {"code": 498, "message": "Invalid token."}});

        // Act
        let result = check_portal_error(&payload);

        // Assert
        assert_eq!(
            result,
            Err(PortalError::Authentication("Invalid token.".to_string()))
        );
    }

    #[test]
    fn test_check_portal_error_maps_missing_item_to_not_found() {
        // Arrange
        let payload = json!({
            "error": {"code": 400, "message": "Item does not exist or is inaccessible."}
        });

        // Act
        let result = check_portal_error(&payload);

        // Assert
        assert!(matches!(result, Err(PortalError::NotFound(_))));
    }

    #[test]
    fn test_check_portal_error_ignores_item_fields_named_error() {
        // Arrange
        let payload = json!({"error": "a string field in user data"});

        // Act
        let result = check_portal_error(&payload);

        // Assert
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_decode_reads_search_page() {
        // Arrange
        let text = r#"{"total": 2, "start": 1, "num": 2, "nextStart": -1,
            "results": [{"id": "a", "title": "A", "type": "Web Map"}, {"id": "b", "title": "B"}]}"#;

        // Act
        let page: SearchPage<ItemMetadata> = decode(text).expect("failed to decode page");

        // Assert
        assert_eq!(page.total, 2);
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.results[0].item_type, "Web Map");
    }

    #[test]
    fn test_add_item_path_includes_folder_when_present() {
        // Arrange
        let owner = "jsmith";

        // Act
        let root_path = add_item_path(owner, None);
        let folder_path = add_item_path(owner, Some("f1"));

        // Assert
        assert_eq!(root_path, "content/users/jsmith/addItem");
        assert_eq!(folder_path, "content/users/jsmith/f1/addItem");
    }

    #[test]
    fn test_add_item_params_carry_metadata_and_text() {
        // Arrange
        let request = AddItemRequest {
            owner: "jsmith".to_string(),
            folder_id: None,
            item: ItemMetadata {
                title: "Roads".to_string(),
                item_type: "Web Map".to_string(),
                tags: vec!["a".to_string(), "b".to_string()],
                snippet: Some("Road network".to_string()),
                ..ItemMetadata::default()
            },
            text: "{}".to_string(),
        };

        // Act
        let params = add_item_params(&request);

        // Assert
        assert!(params.contains(&("title", "Roads".to_string())));
        assert!(params.contains(&("tags", "a,b".to_string())));
        assert!(params.contains(&("snippet", "Road network".to_string())));
        assert!(params.contains(&("text", "{}".to_string())));
        assert!(!params.iter().any(|(name, _)| *name == "description"));
    }

    #[test]
    fn test_auth_params_append_format_and_token() {
        // Arrange
        let session = PortalSession {
            rest_url: "https://maps.arcgis.com/sharing/rest".to_string(),
            token: Some("secret".to_string()),
        };

        // Act
        let params = auth_params(&session, vec![("q", "x".to_string())]);

        // Assert
        assert_eq!(
            params,
            vec![
                ("q", "x".to_string()),
                ("f", "json".to_string()),
                ("token", "secret".to_string()),
            ]
        );
    }
}
