use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthType, AuthUrl, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use serde::{Deserialize, Serialize};

use crate::client::SearchConsole;
use crate::error::{Error, Result};
use crate::reauth::Reauthenticator;

pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Stored OAuth credentials, as written by the consent flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::AuthFailed(format!("could not read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Refreshes the access token with the stored refresh token, persists it and
/// hands it to the client.
pub struct TokenRefresher {
    path: PathBuf,
    client: Arc<SearchConsole>,
}

impl TokenRefresher {
    pub fn new(path: impl Into<PathBuf>, client: Arc<SearchConsole>) -> Self {
        Self {
            path: path.into(),
            client,
        }
    }

    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials> {
        let url_error = |e: oauth2::url::ParseError| Error::AuthFailed(e.to_string());

        let oauth_client = BasicClient::new(
            ClientId::new(credentials.client_id.clone()),
            Some(ClientSecret::new(credentials.client_secret.clone())),
            AuthUrl::new(AUTH_URL.to_string()).map_err(url_error)?,
            Some(TokenUrl::new(credentials.token_uri.clone()).map_err(url_error)?),
        )
        .set_auth_type(AuthType::RequestBody);

        let token = oauth_client
            .exchange_refresh_token(&RefreshToken::new(credentials.refresh_token.clone()))
            .request_async(async_http_client)
            .await
            .map_err(|e| Error::AuthFailed(format!("token refresh failed: {}", e)))?;

        let mut refreshed = credentials.clone();
        refreshed.token = token.access_token().secret().clone();
        if let Some(refresh_token) = token.refresh_token() {
            refreshed.refresh_token = refresh_token.secret().clone();
        }
        Ok(refreshed)
    }
}

#[async_trait]
impl Reauthenticator for TokenRefresher {
    async fn reauthenticate(&self) -> Result<()> {
        let credentials = Credentials::load(&self.path)?;
        let refreshed = self.refresh(&credentials).await?;
        refreshed.save(&self.path)?;
        self.client.set_token(refreshed.token);
        tracing::debug!(path = %self.path.display(), "stored refreshed credentials");
        Ok(())
    }
}
