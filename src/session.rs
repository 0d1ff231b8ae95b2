use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use crate::error::ImportError;
use crate::page::{project_slug, PageContext};
use crate::redmine::{extract_api_key, RedmineApi};

/// Lookups that stay valid for one visit of the time entry page.
///
/// Every field is fetched on first use and kept for the life of the session;
/// a stale key or activity list needs a new session. Concurrent first calls
/// share a single fetch.
pub struct RemoteSession {
    api: Arc<dyn RedmineApi>,
    page: Arc<dyn PageContext>,
    api_key: OnceCell<String>,
    project_id: OnceCell<u64>,
    activities: OnceCell<HashMap<String, u64>>,
}

impl RemoteSession {
    pub fn new(api: Arc<dyn RedmineApi>, page: Arc<dyn PageContext>) -> Self {
        Self {
            api,
            page,
            api_key: OnceCell::new(),
            project_id: OnceCell::new(),
            activities: OnceCell::new(),
        }
    }

    /// Session whose API key is already known, so `/my/api_key` is never called.
    pub fn with_api_key(
        api: Arc<dyn RedmineApi>,
        page: Arc<dyn PageContext>,
        api_key: String,
    ) -> Self {
        let session = Self::new(api, page);
        let _ = session.api_key.set(api_key);
        session
    }

    pub fn api(&self) -> &dyn RedmineApi {
        self.api.as_ref()
    }

    #[instrument(skip_all)]
    pub async fn api_key(&self) -> Result<&str, ImportError> {
        let key = self
            .api_key
            .get_or_try_init(|| async {
                debug!("fetching api key");
                let body = self.api.fetch_api_key_page().await?;
                extract_api_key(&body)
            })
            .await?;
        Ok(key.as_str())
    }

    #[instrument(skip_all)]
    pub async fn project_id(&self) -> Result<u64, ImportError> {
        let id = self
            .project_id
            .get_or_try_init(|| async {
                let slug = project_slug(self.page.location_path())?;
                let key = self.api_key().await?;
                let projects = self.api.list_projects(key).await?;
                let id = projects
                    .iter()
                    .find(|p| p.identifier == slug)
                    .map(|p| p.id)
                    .ok_or_else(|| ImportError::ProjectNotFound(slug.clone()))?;
                info!(project = %slug, id, "resolved project");
                Ok::<_, ImportError>(id)
            })
            .await?;
        Ok(*id)
    }

    pub async fn activity_ids(&self) -> Result<&HashMap<String, u64>, ImportError> {
        self.activities
            .get_or_try_init(|| async {
                let options = self
                    .page
                    .activity_options()
                    .ok_or(ImportError::ActivityMapUnavailable)?;
                Ok::<_, ImportError>(options.into_iter().map(|o| (o.name, o.id)).collect())
            })
            .await
    }

    pub fn current_user_id(&self) -> Result<u64, ImportError> {
        self.page
            .current_user_id()
            .ok_or(ImportError::UserUnavailable)
    }
}
