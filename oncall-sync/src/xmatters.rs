use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::credentials::ScheduleCredentials;
use crate::errors::SyncResult;
use crate::http_utils::{handle_api_response, parse_json_response, transport_error};

const SERVICE: &str = "xMatters";

/// Read access to the on-call service
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn list_group_memberships(&self, user_key: &str) -> SyncResult<Vec<GroupMembership>>;

    async fn list_on_call_shifts(
        &self,
        group_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SyncResult<Vec<OnCallShift>>;
}

/// Paged collection envelope used by every xMatters list endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub total: usize,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub links: Links,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            count: 0,
            total: 0,
            data: Vec::new(),
            links: Links::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Links {
    #[serde(rename = "self", default)]
    pub self_link: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub target_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Member {
    pub id: String,
    pub target_name: String,
    pub external_key: String,
    pub first_name: String,
    pub last_name: String,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupMembership {
    pub group: Group,
    #[serde(default)]
    pub member: Member,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Replacement {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub replacement: Member,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSlot {
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub in_rotation: bool,
    pub member: Member,
    #[serde(default)]
    pub replacements: Page<Replacement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OnCallShift {
    pub group: Group,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub members: Page<MemberSlot>,
}

/// Timestamp layout the on-call endpoint accepts for `from` / `to`
fn query_timestamp(at: DateTime<Utc>) -> String {
    format!("{}Z", at.format("%Y-%m-%dT%H:%M:%S"))
}

pub struct XmattersClient<C> {
    base_url: String,
    credentials: C,
    http_client: reqwest::Client,
}

impl<C: ScheduleCredentials> XmattersClient<C> {
    pub fn new(domain: &str, credentials: C) -> Self {
        let domain = domain.trim().trim_end_matches('/');
        let base_url = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{}", domain)
        };

        Self {
            base_url,
            credentials,
            http_client: reqwest::Client::new(),
        }
    }

    async fn get_page<T>(&self, url: &str, context: &str) -> SyncResult<Page<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        debug!("GET {}", url);
        let response = self
            .http_client
            .get(url)
            .basic_auth(self.credentials.api_key(), Some(self.credentials.api_secret()))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        let response = handle_api_response(SERVICE, response).await?;
        parse_json_response(response, context).await
    }

    /// Fetch the first page and follow `links.next` until exhausted
    async fn get_all<T>(&self, path_and_query: String, context: &str) -> SyncResult<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut next = Some(path_and_query);

        while let Some(link) = next.take() {
            let url = if link.starts_with("http") {
                link
            } else {
                format!("{}{}", self.base_url, link)
            };

            let page: Page<T> = self.get_page(&url, context).await?;
            items.extend(page.data);
            next = page.links.next.filter(|n| !n.is_empty());
        }

        Ok(items)
    }
}

#[async_trait]
impl<C: ScheduleCredentials> ScheduleSource for XmattersClient<C> {
    async fn list_group_memberships(&self, user_key: &str) -> SyncResult<Vec<GroupMembership>> {
        let path = format!(
            "/api/xm/1/people/{}/group-memberships",
            urlencoding::encode(user_key)
        );

        let memberships: Vec<GroupMembership> =
            self.get_all(path, "xMatters group memberships").await?;
        info!("Found {} group memberships for {}", memberships.len(), user_key);
        Ok(memberships)
    }

    async fn list_on_call_shifts(
        &self,
        group_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SyncResult<Vec<OnCallShift>> {
        let path = format!(
            "/api/xm/1/on-call?groups={}&from={}&to={}",
            urlencoding::encode(group_id),
            query_timestamp(from),
            query_timestamp(to),
        );

        let shifts: Vec<OnCallShift> = self.get_all(path, "xMatters on-call").await?;
        info!("Fetched {} on-call shifts for group {}", shifts.len(), group_id);
        Ok(shifts)
    }
}
