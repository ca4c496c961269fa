//! Sign-in strategies that turn a connection into a portal credential.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use url::Url;

use crate::infra::portal::{PortalClient, PortalError, PortalFuture, PortalSession, TokenExchange};
use crate::infra::prompt::Prompter;

/// Redirect URI for OAuth flows where the user copies the code by hand.
pub const OUT_OF_BAND_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
/// Default upper bound for one sign-in attempt.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(60);
/// Requested token lifetime in minutes (two weeks).
const TOKEN_EXPIRATION_MINUTES: &str = "20160";

/// Signed-in identity used for every authenticated call of a connection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Credential {
    pub token: String,
    pub username: String,
    /// Organization of the signed-in user, used to scope default searches.
    pub org_id: Option<String>,
}

impl Credential {
    /// Returns the session for calls against `rest_url` with this credential.
    pub fn session(&self, rest_url: &str) -> PortalSession {
        PortalSession {
            rest_url: rest_url.to_string(),
            token: Some(self.token.clone()),
        }
    }
}

/// Portal a sign-in is requested for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthRequest {
    pub rest_url: String,
    pub app_id: String,
}

/// Sign-in boundary used by [`crate::app::connection::PortalConnection`].
#[cfg_attr(test, mockall::automock)]
pub trait Authenticator: Send + Sync {
    /// Obtains a fresh credential.
    ///
    /// # Errors
    /// Returns [`PortalError::Authentication`] when sign-in is rejected or
    /// cancelled and [`PortalError::Timeout`] when it does not finish in time.
    fn authenticate(&self, request: AuthRequest) -> PortalFuture<Result<Credential, PortalError>>;
}

/// OAuth 2.0 authorization-code sign-in with a pasted code.
///
/// The user opens the authorize URL for the connection's app id, signs in in
/// a browser and pastes the code shown by the portal back into the host.
pub struct OAuthAuthenticator {
    client: Arc<dyn PortalClient>,
    prompter: Arc<dyn Prompter>,
    timeout: Duration,
}

impl OAuthAuthenticator {
    pub fn new(
        client: Arc<dyn PortalClient>,
        prompter: Arc<dyn Prompter>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            prompter,
            timeout,
        }
    }
}

impl Authenticator for OAuthAuthenticator {
    fn authenticate(&self, request: AuthRequest) -> PortalFuture<Result<Credential, PortalError>> {
        let client = Arc::clone(&self.client);
        let prompter = Arc::clone(&self.prompter);
        let timeout = self.timeout;

        Box::pin(async move {
            match tokio::time::timeout(
                timeout,
                sign_in_with_code(client.as_ref(), prompter.as_ref(), &request),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(PortalError::Timeout(timeout.as_secs())),
            }
        })
    }
}

async fn sign_in_with_code(
    client: &dyn PortalClient,
    prompter: &dyn Prompter,
    request: &AuthRequest,
) -> Result<Credential, PortalError> {
    let authorize_url = authorize_url(request)?;
    let code = prompter
        .input(
            format!("Sign in at {authorize_url} and paste the authorization code"),
            String::new(),
        )
        .await
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty())
        .ok_or_else(|| PortalError::Authentication("Sign-in was cancelled".to_string()))?;

    let grant = client
        .exchange_code(
            request.rest_url.clone(),
            TokenExchange {
                app_id: request.app_id.clone(),
                code,
                redirect_uri: OUT_OF_BAND_REDIRECT_URI.to_string(),
            },
        )
        .await?;

    resolve_credential(client, &request.rest_url, grant.access_token).await
}

/// Sign-in with a pre-issued token, validated against the portal once.
pub struct TokenAuthenticator {
    client: Arc<dyn PortalClient>,
    token: String,
}

impl TokenAuthenticator {
    pub fn new(client: Arc<dyn PortalClient>, token: impl Into<String>) -> Self {
        Self {
            client,
            token: token.into(),
        }
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, request: AuthRequest) -> PortalFuture<Result<Credential, PortalError>> {
        let client = Arc::clone(&self.client);
        let token = self.token.clone();

        Box::pin(async move { resolve_credential(client.as_ref(), &request.rest_url, token).await })
    }
}

/// Builds the browser sign-in URL for `request`.
///
/// # Errors
/// Returns [`PortalError::Authentication`] when the REST URL is malformed.
pub fn authorize_url(request: &AuthRequest) -> Result<Url, PortalError> {
    let mut url = Url::parse(&format!("{}/oauth2/authorize", request.rest_url))
        .map_err(|error| PortalError::Authentication(format!("Invalid portal URL: {error}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", &request.app_id)
        .append_pair("response_type", "code")
        .append_pair("expiration", TOKEN_EXPIRATION_MINUTES)
        .append_pair("redirect_uri", OUT_OF_BAND_REDIRECT_URI);

    Ok(url)
}

async fn resolve_credential(
    client: &dyn PortalClient,
    rest_url: &str,
    token: String,
) -> Result<Credential, PortalError> {
    let session = PortalSession {
        rest_url: rest_url.to_string(),
        token: Some(token.clone()),
    };
    let profile = client.get_self(session).await?;
    if profile.username.is_empty() {
        return Err(PortalError::Authentication(
            "The portal did not report a signed-in user".to_string(),
        ));
    }
    info!(username = %profile.username, rest_url, "Signed in to portal");

    Ok(Credential {
        token,
        username: profile.username,
        org_id: profile.org_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::item::UserProfile;
    use crate::infra::portal::{MockPortalClient, TokenGrant};
    use crate::infra::prompt::MockPrompter;

    fn auth_request() -> AuthRequest {
        AuthRequest {
            rest_url: "https://maps.arcgis.com/sharing/rest".to_string(),
            app_id: "app-1".to_string(),
        }
    }

    fn profile(username: &str) -> UserProfile {
        UserProfile {
            username: username.to_string(),
            org_id: Some("org-1".to_string()),
            ..UserProfile::default()
        }
    }

    #[test]
    fn test_authorize_url_carries_app_id_and_redirect() {
        // Arrange
        let request = auth_request();

        // Act
        let url = authorize_url(&request).expect("failed to build url");

        // Assert
        assert_eq!(url.path(), "/sharing/rest/oauth2/authorize");
        let pairs = url.query_pairs().into_owned().collect::<Vec<_>>();
        assert!(pairs.contains(&("client_id".to_string(), "app-1".to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            OUT_OF_BAND_REDIRECT_URI.to_string()
        )));
    }

    #[tokio::test]
    async fn test_oauth_authenticate_exchanges_pasted_code() {
        // Arrange
        let mut prompter = MockPrompter::new();
        prompter
            .expect_input()
            .times(1)
            .returning(|_, _| Box::pin(async { Some(" code-1 ".to_string()) }));
        let mut client = MockPortalClient::new();
        client
            .expect_exchange_code()
            .withf(|_, exchange| exchange.code == "code-1" && exchange.app_id == "app-1")
            .times(1)
            .returning(|_, _| {
                Box::pin(async {
                    Ok(TokenGrant {
                        access_token: "token-1".to_string(),
                        ..TokenGrant::default()
                    })
                })
            });
        client
            .expect_get_self()
            .withf(|session| session.token.as_deref() == Some("token-1"))
            .times(1)
            .returning(|_| Box::pin(async { Ok(profile("jsmith")) }));
        let authenticator = OAuthAuthenticator::new(
            Arc::new(client),
            Arc::new(prompter),
            DEFAULT_AUTH_TIMEOUT,
        );

        // Act
        let credential = authenticator.authenticate(auth_request()).await;

        // Assert
        assert_eq!(
            credential,
            Ok(Credential {
                token: "token-1".to_string(),
                username: "jsmith".to_string(),
                org_id: Some("org-1".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn test_oauth_authenticate_fails_when_sign_in_is_cancelled() {
        // Arrange
        let mut prompter = MockPrompter::new();
        prompter
            .expect_input()
            .returning(|_, _| Box::pin(async { None }));
        let authenticator = OAuthAuthenticator::new(
            Arc::new(MockPortalClient::new()),
            Arc::new(prompter),
            DEFAULT_AUTH_TIMEOUT,
        );

        // Act
        let result = authenticator.authenticate(auth_request()).await;

        // Assert
        assert!(matches!(result, Err(PortalError::Authentication(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oauth_authenticate_times_out_without_answer() {
        // Arrange
        let mut prompter = MockPrompter::new();
        prompter
            .expect_input()
            .times(1)
            .returning(|_, _| Box::pin(std::future::pending::<Option<String>>()));
        let authenticator = OAuthAuthenticator::new(
            Arc::new(MockPortalClient::new()),
            Arc::new(prompter),
            DEFAULT_AUTH_TIMEOUT,
        );

        // Act
        let result = authenticator.authenticate(auth_request()).await;

        // Assert
        assert_eq!(
            result,
            Err(PortalError::Timeout(DEFAULT_AUTH_TIMEOUT.as_secs()))
        );
    }

    #[tokio::test]
    async fn test_token_authenticate_rejects_anonymous_profile() {
        // Arrange
        let mut client = MockPortalClient::new();
        client
            .expect_get_self()
            .returning(|_| Box::pin(async { Ok(UserProfile::default()) }));
        let authenticator = TokenAuthenticator::new(Arc::new(client), "token-1");

        // Act
        let result = authenticator.authenticate(auth_request()).await;

        // Assert
        assert!(matches!(result, Err(PortalError::Authentication(_))));
    }
}
