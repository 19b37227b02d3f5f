use oauth2::basic::BasicClient;
use oauth2::{AuthType, AuthUrl, ClientId, ClientSecret, TokenResponse, TokenUrl};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::watch;
use tonic::metadata::MetadataValue;
use tonic::service::Interceptor;
use tonic::Status;

use crate::{Error, Result};

/// The Camunda SaaS token endpoint, used when no authorization server is configured.
pub const DEFAULT_AUTH_SERVER_URL: &str = "https://login.cloud.camunda.io/oauth/token/";

/// The default timeout for OAuth requests
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Offset from access token expiration time at which new tokens are requested.
const CLOCK_SKEW_BUFFER: Duration = Duration::from_secs(15);

/// Delay before requesting a token again after a failed attempt.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Token lifetime assumed when the authorization server omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(60);

/// Client credentials used to obtain access tokens for the gateway.
#[derive(Clone)]
pub struct OAuthConfig {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Audience the token is requested for, usually the gateway host
    pub audience: String,
    /// Token endpoint of the authorization server
    pub authorization_server_url: String,
    /// Timeout for a single token request
    pub request_timeout: Duration,
}

impl OAuthConfig {
    /// Credentials against the default authorization server.
    pub fn new<T: Into<String>>(client_id: T, client_secret: T, audience: T) -> Self {
        OAuthConfig {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            audience: audience.into(),
            authorization_server_url: DEFAULT_AUTH_SERVER_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Use a different token endpoint.
    pub fn with_authorization_server_url<T: Into<String>>(self, url: T) -> Self {
        OAuthConfig {
            authorization_server_url: url.into(),
            ..self
        }
    }

    /// Set the timeout for a single token request.
    pub fn with_request_timeout(self, request_timeout: Duration) -> Self {
        OAuthConfig {
            request_timeout,
            ..self
        }
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"****")
            .field("audience", &self.audience)
            .field("authorization_server_url", &self.authorization_server_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Attaches the current bearer token to every gateway request.
///
/// Tokens are fetched by a background task and published through a watch
/// channel; the task stops once every interceptor clone has been dropped.
#[derive(Clone, Default)]
pub(crate) struct AuthInterceptor {
    token: Option<watch::Receiver<Option<String>>>,
}

impl fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthInterceptor")
            .field("configured", &self.token.is_some())
            .finish()
    }
}

impl AuthInterceptor {
    /// Start refreshing tokens. Must be called within a tokio runtime.
    pub(crate) fn init(config: OAuthConfig) -> Result<Self> {
        let auth_url = AuthUrl::new(config.authorization_server_url.clone())
            .map_err(|err| Error::Auth(err.to_string()))?;
        let token_url = TokenUrl::new(config.authorization_server_url)
            .map_err(|err| Error::Auth(err.to_string()))?;
        let oauth2_client = BasicClient::new(
            ClientId::new(config.client_id),
            Some(ClientSecret::new(config.client_secret)),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody);

        let (sender, receiver) = watch::channel(None);
        tokio::spawn(refresh_tokens(
            oauth2_client,
            config.audience,
            config.request_timeout,
            sender,
        ));

        Ok(AuthInterceptor {
            token: Some(receiver),
        })
    }

    pub(crate) async fn auth_initialized(&self) -> Result<()> {
        let Some(token) = &self.token else {
            tracing::debug!("oauth not configured, skipping initialization");
            return Ok(());
        };

        tracing::debug!("awaiting first oauth token");
        let mut token = token.clone();
        token
            .wait_for(Option::is_some)
            .await
            .map(|_| ())
            .map_err(|_| Error::Auth("token refresh stopped before a token arrived".to_owned()))
    }
}

impl Interceptor for AuthInterceptor {
    fn call(
        &mut self,
        mut request: tonic::Request<()>,
    ) -> std::result::Result<tonic::Request<()>, Status> {
        if let Some(token) = &self.token {
            let header = token
                .borrow()
                .as_ref()
                .map(|access_token| format!("Bearer {}", access_token))
                .ok_or_else(|| Status::unauthenticated("No valid token available"))?;

            let value = MetadataValue::from_str(&header)
                .map_err(|error| Status::unauthenticated(error.to_string()))?;

            request.metadata_mut().insert("authorization", value);
        }

        Ok(request)
    }
}

async fn refresh_tokens(
    client: BasicClient,
    audience: String,
    request_timeout: Duration,
    sender: watch::Sender<Option<String>>,
) {
    loop {
        let delay = match request_token(&client, &audience, request_timeout).await {
            Ok((access_token, lifetime)) => {
                sender.send_replace(Some(access_token));
                tracing::debug!(?lifetime, "updated cached access token");
                lifetime
                    .saturating_sub(CLOCK_SKEW_BUFFER)
                    .max(Duration::from_secs(1))
            }
            Err(err) => {
                tracing::error!(%err, "error getting oauth token");
                RETRY_DELAY
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = sender.closed() => {
                tracing::debug!("client dropped, stopping token refresh");
                return;
            }
        }
    }
}

async fn request_token(
    client: &BasicClient,
    audience: &str,
    request_timeout: Duration,
) -> Result<(String, Duration)> {
    tracing::debug!("requesting new oauth token");

    let request = client
        .exchange_client_credentials()
        .add_extra_param("audience", audience.to_owned());

    let response = tokio::time::timeout(
        request_timeout,
        request.request_async(oauth2::reqwest::async_http_client),
    )
    .await
    .map_err(|_| {
        Error::Auth(format!(
            "timed out waiting for oauth token after {} milliseconds",
            request_timeout.as_millis()
        ))
    })?
    .map_err(|err| Error::Auth(err.to_string()))?;

    Ok((
        response.access_token().secret().clone(),
        response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME),
    ))
}
