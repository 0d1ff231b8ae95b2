use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Request, Response, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use tracing::debug;

use crate::error::ImportError;
use crate::model::{NewTimeEntry, Project, RemoteTimeEntry};

pub const API_KEY_HEADER: &str = "X-Redmine-API-Key";
/// Largest page Redmine serves for list endpoints.
pub const MAX_PAGE_SIZE: u32 = 100;
const MAX_PROJECT_PAGES: u32 = 20;

static API_KEY_PRE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<pre>(.*?)</pre>").expect("valid api key regex"));

/// Filter for `GET /time_entries.json`. Dates are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeEntryQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub project_id: u64,
    pub user_id: u64,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TimeEntryPage {
    pub time_entries: Vec<RemoteTimeEntry>,
    #[serde(default)]
    pub total_count: Option<u32>,
}

#[derive(Deserialize)]
struct ProjectPage {
    projects: Vec<Project>,
    #[serde(default)]
    total_count: Option<u32>,
}

#[derive(Deserialize)]
struct CreatedTimeEntry {
    time_entry: CreatedId,
}

#[derive(Deserialize)]
struct CreatedId {
    id: u64,
}

/// The four Redmine endpoints the importer talks to.
#[async_trait]
pub trait RedmineApi: Send + Sync {
    /// Raw body of `/my/api_key`.
    async fn fetch_api_key_page(&self) -> Result<String, ImportError>;

    async fn list_projects(&self, api_key: &str) -> Result<Vec<Project>, ImportError>;

    async fn list_time_entries(
        &self,
        api_key: &str,
        query: &TimeEntryQuery,
    ) -> Result<TimeEntryPage, ImportError>;

    /// Returns the id of the created entry when the server reports one.
    async fn create_time_entry(
        &self,
        api_key: &str,
        entry: &NewTimeEntry,
    ) -> Result<Option<u64>, ImportError>;
}

/// Pull the key out of the `<pre>...</pre>` block of `/my/api_key`.
pub fn extract_api_key(body: &str) -> Result<String, ImportError> {
    API_KEY_PRE
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|key| !key.is_empty())
        .ok_or(ImportError::AuthUnavailable)
}

#[derive(Clone)]
pub struct RedmineClient {
    http: Client,
    base_url: Url,
    session_cookie: Option<String>,
}

impl fmt::Debug for RedmineClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedmineClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RedmineClient {
    /// `session_cookie` is sent only to `/my/api_key`, which is not served to API keys.
    pub fn new(base_url: &str, session_cookie: Option<String>) -> Result<Self, ImportError> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| ImportError::RemoteRequestFailed(format!("invalid base URL: {}", e)))?;
        let http = Client::builder()
            .user_agent("timesheet-import/0.1")
            .build()?;
        Ok(Self {
            http,
            base_url,
            session_cookie,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ImportError> {
        self.base_url
            .join(path)
            .map_err(|e| ImportError::RemoteRequestFailed(format!("invalid endpoint {}: {}", path, e)))
    }

    pub fn build_api_key_request(&self) -> Result<Request, ImportError> {
        let mut builder = self.http.get(self.endpoint("my/api_key")?);
        if let Some(cookie) = &self.session_cookie {
            builder = builder.header("Cookie", cookie);
        }
        Ok(builder.build()?)
    }

    pub fn build_projects_request(&self, api_key: &str, offset: u32) -> Result<Request, ImportError> {
        Ok(self
            .http
            .get(self.endpoint("projects.json")?)
            .header(API_KEY_HEADER, api_key)
            .query(&[("limit", MAX_PAGE_SIZE), ("offset", offset)])
            .build()?)
    }

    pub fn build_time_entries_request(
        &self,
        api_key: &str,
        query: &TimeEntryQuery,
    ) -> Result<Request, ImportError> {
        Ok(self
            .http
            .get(self.endpoint("time_entries.json")?)
            .header(API_KEY_HEADER, api_key)
            .query(&[
                ("from", query.from.format("%Y-%m-%d").to_string()),
                ("to", query.to.format("%Y-%m-%d").to_string()),
                ("project_id", query.project_id.to_string()),
                ("user_id", query.user_id.to_string()),
                ("limit", query.limit.to_string()),
                ("offset", query.offset.to_string()),
            ])
            .build()?)
    }

    pub fn build_create_request(
        &self,
        api_key: &str,
        entry: &NewTimeEntry,
    ) -> Result<Request, ImportError> {
        Ok(self
            .http
            .post(self.endpoint("time_entries.json")?)
            .header(API_KEY_HEADER, api_key)
            .header("Content-Type", "application/json")
            .json(&json!({ "time_entry": entry }))
            .build()?)
    }

    async fn execute(&self, request: Request) -> Result<Response, ImportError> {
        debug!(method=%request.method(), url=%request.url(), "sending redmine request");
        let res = self.http.execute(request).await?;
        let status = res.status();
        debug!(%status, "received redmine response");
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ImportError::RemoteRequestFailed(format!(
                "redmine error {}: {}",
                status, body
            )));
        }
        Ok(res)
    }
}

#[async_trait]
impl RedmineApi for RedmineClient {
    async fn fetch_api_key_page(&self) -> Result<String, ImportError> {
        let res = self.execute(self.build_api_key_request()?).await?;
        Ok(res.text().await?)
    }

    async fn list_projects(&self, api_key: &str) -> Result<Vec<Project>, ImportError> {
        let mut projects = Vec::new();
        for page in 0..MAX_PROJECT_PAGES {
            let offset = page * MAX_PAGE_SIZE;
            let res = self
                .execute(self.build_projects_request(api_key, offset)?)
                .await?;
            let body: ProjectPage = res.json().await?;
            let received = body.projects.len() as u32;
            projects.extend(body.projects);
            let total = body.total_count.unwrap_or(0);
            if received == 0 || offset + received >= total {
                break;
            }
        }
        Ok(projects)
    }

    async fn list_time_entries(
        &self,
        api_key: &str,
        query: &TimeEntryQuery,
    ) -> Result<TimeEntryPage, ImportError> {
        let res = self
            .execute(self.build_time_entries_request(api_key, query)?)
            .await?;
        Ok(res.json().await?)
    }

    async fn create_time_entry(
        &self,
        api_key: &str,
        entry: &NewTimeEntry,
    ) -> Result<Option<u64>, ImportError> {
        let res = self
            .execute(self.build_create_request(api_key, entry)?)
            .await?;
        let body = res.text().await.unwrap_or_default();
        Ok(serde_json::from_str::<CreatedTimeEntry>(&body)
            .ok()
            .map(|created| created.time_entry.id))
    }
}
