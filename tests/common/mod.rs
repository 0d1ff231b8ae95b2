#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use timesheet_import::model::{ActivityOption, NewTimeEntry, Project, RemoteTimeEntry};
use timesheet_import::page::StaticPage;
use timesheet_import::redmine::{RedmineApi, TimeEntryPage, TimeEntryQuery};
use timesheet_import::ImportError;
use tokio::sync::{Mutex, Notify};

pub const HEADER: &str =
    "Category\tTask\tDescription\t\t3/7/2023\t4/7/2023\t5/7/2023\t6/7/2023\t7/7/2023\t8/7/2023\t9/7/2023";
pub const SPACER: &str = "\t\t\t\tMon\tTue\tWed\tThu\tFri\tSat\tSun";

pub fn sheet(rows: &[&str]) -> String {
    let mut lines = vec![HEADER, SPACER];
    lines.extend_from_slice(rows);
    lines.join("\n")
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 7, d).unwrap()
}

pub fn page() -> StaticPage {
    StaticPage::new(
        "/projects/acme/time_entries/new",
        Some(17),
        Some(vec![
            ActivityOption {
                name: "Dev".into(),
                id: 9,
            },
            ActivityOption {
                name: "Meeting".into(),
                id: 10,
            },
        ]),
    )
}

/// Holds one call until released. Listing calls are held after they have read
/// the server state.
pub struct Gate {
    pub call: usize,
    pub entered: Notify,
    pub release: Notify,
}

impl Gate {
    fn on_call(call: usize) -> Arc<Self> {
        Arc::new(Self {
            call,
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

/// In-memory Redmine that records every call. Created entries become visible
/// to later listings, like on the real server.
#[derive(Clone, Default)]
pub struct RecordingRedmine {
    pub key_page: Arc<Mutex<String>>,
    pub projects: Arc<Mutex<Vec<Project>>>,
    pub remote: Arc<Mutex<Vec<RemoteTimeEntry>>>,
    pub pages: Arc<Mutex<VecDeque<TimeEntryPage>>>,
    pub list_failures: Arc<Mutex<VecDeque<ImportError>>>,
    pub create_responses: Arc<Mutex<VecDeque<Result<Option<u64>, ImportError>>>>,
    pub key_calls: Arc<AtomicUsize>,
    pub project_calls: Arc<AtomicUsize>,
    pub queries: Arc<Mutex<Vec<TimeEntryQuery>>>,
    pub create_calls: Arc<Mutex<Vec<NewTimeEntry>>>,
    pub list_gate: Option<Arc<Gate>>,
    pub create_gate: Option<Arc<Gate>>,
}

impl RecordingRedmine {
    pub fn new() -> Self {
        let api = Self::default();
        *api.key_page.try_lock().unwrap() =
            "<h2>API access key</h2><div class=\"box\"><pre>secret-key</pre></div>".into();
        *api.projects.try_lock().unwrap() = vec![
            Project {
                id: 3,
                identifier: "other".into(),
                name: "Other".into(),
            },
            Project {
                id: 5,
                identifier: "acme".into(),
                name: "Acme".into(),
            },
        ];
        api
    }

    pub fn with_list_gate(self) -> Self {
        self.with_list_gate_on(1)
    }

    pub fn with_list_gate_on(mut self, call: usize) -> Self {
        self.list_gate = Some(Gate::on_call(call));
        self
    }

    pub fn with_create_gate(mut self) -> Self {
        self.create_gate = Some(Gate::on_call(1));
        self
    }

    /// The next listing call fails with `err`.
    pub async fn push_list_failure(&self, err: ImportError) {
        self.list_failures.lock().await.push_back(err);
    }

    pub async fn push_create_response(&self, response: Result<Option<u64>, ImportError>) {
        self.create_responses.lock().await.push_back(response);
    }

    pub async fn add_remote(&self, hours: f64, comments: &str, spent_on: NaiveDate) {
        self.remote.lock().await.push(RemoteTimeEntry {
            id: None,
            hours,
            comments: comments.into(),
            spent_on,
        });
    }

    pub async fn create_calls(&self) -> Vec<NewTimeEntry> {
        self.create_calls.lock().await.clone()
    }

    pub async fn queries(&self) -> Vec<TimeEntryQuery> {
        self.queries.lock().await.clone()
    }
}

#[async_trait]
impl RedmineApi for RecordingRedmine {
    async fn fetch_api_key_page(&self) -> Result<String, ImportError> {
        self.key_calls.fetch_add(1, Ordering::SeqCst);
        // Give a racing caller the chance to start a second fetch.
        tokio::task::yield_now().await;
        Ok(self.key_page.lock().await.clone())
    }

    async fn list_projects(&self, _api_key: &str) -> Result<Vec<Project>, ImportError> {
        self.project_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(self.projects.lock().await.clone())
    }

    async fn list_time_entries(
        &self,
        _api_key: &str,
        query: &TimeEntryQuery,
    ) -> Result<TimeEntryPage, ImportError> {
        let call = {
            let mut queries = self.queries.lock().await;
            queries.push(query.clone());
            queries.len()
        };
        if let Some(err) = self.list_failures.lock().await.pop_front() {
            return Err(err);
        }
        let page = match self.pages.lock().await.pop_front() {
            Some(page) => page,
            None => {
                let time_entries = self
                    .remote
                    .lock()
                    .await
                    .iter()
                    .filter(|e| e.spent_on >= query.from && e.spent_on <= query.to)
                    .cloned()
                    .collect();
                TimeEntryPage {
                    time_entries,
                    total_count: None,
                }
            }
        };
        if let Some(gate) = self.list_gate.as_ref().filter(|g| g.call == call) {
            gate.pass().await;
        }
        Ok(page)
    }

    async fn create_time_entry(
        &self,
        _api_key: &str,
        entry: &NewTimeEntry,
    ) -> Result<Option<u64>, ImportError> {
        let call = {
            let mut calls = self.create_calls.lock().await;
            calls.push(entry.clone());
            calls.len()
        };
        if let Some(gate) = self.create_gate.as_ref().filter(|g| g.call == call) {
            gate.pass().await;
        }
        let response = self
            .create_responses
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(Some(call as u64)));
        if response.is_ok() {
            self.remote.lock().await.push(RemoteTimeEntry {
                id: None,
                hours: entry.hours,
                comments: entry.comments.clone(),
                spent_on: NaiveDate::parse_from_str(&entry.spent_on, "%Y-%m-%d").unwrap(),
            });
        }
        response
    }
}
