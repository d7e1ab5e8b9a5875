use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthUrl, AuthorizationCode, ClientId,
    ClientSecret, CsrfToken, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::config::GoogleCalendarConfig;
use crate::credentials::AccessTokenProvider;
use crate::errors::{SyncError, SyncResult};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
const TOKEN_FILE: &str = "google_calendar_token.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl StoredToken {
    /// True when the token is gone or will be within the refresh margin
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::minutes(5) >= expires_at,
            None => false,
        }
    }
}

/// OAuth token persisted in the data dir, refreshed on demand
pub struct GoogleTokenStore {
    config: GoogleCalendarConfig,
    token_file_path: PathBuf,
    cached: RwLock<Option<StoredToken>>,
}

impl GoogleTokenStore {
    pub fn new(config: GoogleCalendarConfig, data_dir: &Path) -> Self {
        Self {
            config,
            token_file_path: data_dir.join(TOKEN_FILE),
            cached: RwLock::new(None),
        }
    }

    pub fn token_file_path(&self) -> &Path {
        &self.token_file_path
    }

    fn oauth_client(&self) -> SyncResult<BasicClient> {
        let auth_url = AuthUrl::new(AUTH_URL.to_string()).map_err(auth_error)?;
        let token_url = TokenUrl::new(TOKEN_URL.to_string()).map_err(auth_error)?;
        let redirect_url = RedirectUrl::new(self.config.redirect_uri.clone()).map_err(auth_error)?;

        Ok(BasicClient::new(
            ClientId::new(self.config.client_id.clone()),
            Some(ClientSecret::new(self.config.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(redirect_url))
    }

    /// Consent URL for first-time setup; offline access so we get a refresh token
    pub fn get_auth_url(&self) -> SyncResult<(String, CsrfToken)> {
        let (auth_url, csrf_token) = self
            .oauth_client()?
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(CALENDAR_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        Ok((auth_url.to_string(), csrf_token))
    }

    /// Exchange authorization code for access token
    pub async fn authenticate_with_code(&self, auth_code: &str) -> SyncResult<StoredToken> {
        debug!("Exchanging authorization code for access token");

        let token_result = self
            .oauth_client()?
            .exchange_code(AuthorizationCode::new(auth_code.trim().to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| SyncError::Authentication {
                message: format!("Failed to exchange authorization code: {}", e),
            })?;

        let stored_token = StoredToken {
            access_token: token_result.access_token().secret().clone(),
            refresh_token: token_result.refresh_token().map(|t| t.secret().clone()),
            expires_at: token_result
                .expires_in()
                .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64)),
            scopes: vec![CALENDAR_SCOPE.to_string()],
        };

        self.store_token(&stored_token).await?;
        info!("Google Calendar authentication successful");
        Ok(stored_token)
    }

    /// Refresh expired access token
    async fn refresh_token(&self, current_token: &StoredToken) -> SyncResult<StoredToken> {
        let refresh_token = current_token.refresh_token.as_ref().ok_or_else(|| {
            SyncError::Authentication {
                message: "Access token expired and no refresh token is stored. Run `oncall-calendar-sync auth-google`".to_string(),
            }
        })?;

        let token_result = self
            .oauth_client()?
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request_async(async_http_client)
            .await
            .map_err(|e| SyncError::Authentication {
                message: format!("Failed to refresh token: {}", e),
            })?;

        let new_token = StoredToken {
            access_token: token_result.access_token().secret().clone(),
            // Google only sends a refresh token on first consent
            refresh_token: token_result
                .refresh_token()
                .map(|t| t.secret().clone())
                .or_else(|| Some(refresh_token.clone())),
            expires_at: token_result
                .expires_in()
                .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64)),
            scopes: current_token.scopes.clone(),
        };

        self.store_token(&new_token).await?;
        info!("Google Calendar token refreshed successfully");
        Ok(new_token)
    }

    pub async fn is_authenticated(&self) -> bool {
        match self.load_stored_token().await {
            Ok(token) => token.refresh_token.is_some() || !token.needs_refresh(Utc::now()),
            Err(_) => false,
        }
    }

    pub async fn store_token(&self, token: &StoredToken) -> SyncResult<()> {
        if let Some(parent) = self.token_file_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::file_system("create_dir", parent, e))?;
        }

        let token_json = serde_json::to_string_pretty(token)?;
        fs::write(&self.token_file_path, token_json)
            .await
            .map_err(|e| SyncError::file_system("write", &self.token_file_path, e))?;

        *self.cached.write() = Some(token.clone());
        debug!("Stored Google Calendar token to {:?}", self.token_file_path);
        Ok(())
    }

    async fn load_stored_token(&self) -> SyncResult<StoredToken> {
        let cached = self.cached.read().clone();
        if let Some(token) = cached {
            return Ok(token);
        }

        let token_data = fs::read_to_string(&self.token_file_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SyncError::Authentication {
                    message: "Not signed in to Google Calendar. Run `oncall-calendar-sync auth-google`".to_string(),
                },
                _ => SyncError::file_system("read", &self.token_file_path, e),
            })?;
        let token: StoredToken = serde_json::from_str(&token_data)?;

        *self.cached.write() = Some(token.clone());
        Ok(token)
    }
}

#[async_trait]
impl AccessTokenProvider for GoogleTokenStore {
    /// Get a valid access token, refreshing if necessary
    async fn access_token(&self) -> SyncResult<String> {
        let token = self.load_stored_token().await?;

        if token.needs_refresh(Utc::now()) {
            debug!("Access token expired, refreshing...");
            return Ok(self.refresh_token(&token).await?.access_token);
        }

        Ok(token.access_token)
    }
}

fn auth_error(error: oauth2::url::ParseError) -> SyncError {
    SyncError::Authentication {
        message: format!("Invalid OAuth URL: {}", error),
    }
}
