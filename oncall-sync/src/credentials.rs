use async_trait::async_trait;

use crate::config::XmattersConfig;
use crate::errors::SyncResult;

/// Basic-auth credentials for the on-call service
pub trait ScheduleCredentials: Send + Sync {
    fn api_key(&self) -> &str;
    fn api_secret(&self) -> &str;
}

/// Supplies a bearer token for calendar requests
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> SyncResult<String>;
}

#[derive(Clone)]
pub struct StaticCredentials {
    api_key: String,
    api_secret: String,
}

impl StaticCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

impl From<&XmattersConfig> for StaticCredentials {
    fn from(config: &XmattersConfig) -> Self {
        Self::new(config.api_key.clone(), config.api_secret.clone())
    }
}

impl ScheduleCredentials for StaticCredentials {
    fn api_key(&self) -> &str {
        &self.api_key
    }

    fn api_secret(&self) -> &str {
        &self.api_secret
    }
}

// Keep secrets out of debug logs
impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"***")
            .finish()
    }
}
