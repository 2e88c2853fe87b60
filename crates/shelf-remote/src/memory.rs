//! In-process [`RemoteApi`] over a list of pages, with scriptable failures.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::api::{Properties, QueryFilter, QueryPage, RemoteApi, RemoteError, RemotePage, UpdateStatus};
use crate::property::Schema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub schema: usize,
    pub query: usize,
    pub get: usize,
    pub create: usize,
    pub update: usize,
}

impl CallCounts {
    pub fn mutations(&self) -> usize {
        self.create + self.update
    }
}

#[derive(Debug, Default)]
struct State {
    schema: Schema,
    /// Scan order is insertion order.
    pages: Vec<RemotePage>,
    scripted_updates: HashMap<String, VecDeque<UpdateStatus>>,
    fail_creates: bool,
    fail_queries: bool,
    fail_schema: bool,
    calls: CallCounts,
}

#[derive(Debug, Default)]
pub struct InMemoryRemote {
    state: Mutex<State>,
}

impl InMemoryRemote {
    pub fn new(schema: Schema) -> Self {
        Self {
            state: Mutex::new(State {
                schema,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // a panic while holding the lock only happens in a failing test
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, properties: Properties) -> String {
        let id = Uuid::new_v4().to_string();
        self.insert_with_id(&id, properties);
        id
    }

    pub fn insert_with_id(&self, id: &str, properties: Properties) {
        self.state().pages.push(RemotePage {
            id: id.to_string(),
            properties,
        });
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut state = self.state();
        let before = state.pages.len();
        state.pages.retain(|p| p.id != id);
        state.pages.len() != before
    }

    pub fn page(&self, id: &str) -> Option<RemotePage> {
        self.state().pages.iter().find(|p| p.id == id).cloned()
    }

    pub fn pages(&self) -> Vec<RemotePage> {
        self.state().pages.clone()
    }

    /// Queues a status returned by the next update against `id`, ahead of
    /// the normal behavior.
    pub fn script_update(&self, id: &str, status: UpdateStatus) {
        self.state()
            .scripted_updates
            .entry(id.to_string())
            .or_default()
            .push_back(status);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.state().fail_creates = fail;
    }

    pub fn fail_queries(&self, fail: bool) {
        self.state().fail_queries = fail;
    }

    pub fn fail_schema(&self, fail: bool) {
        self.state().fail_schema = fail;
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    pub fn reset_calls(&self) {
        self.state().calls = CallCounts::default();
    }
}

fn unavailable() -> RemoteError {
    RemoteError::Status {
        status: 503,
        body: "unavailable".into(),
    }
}

#[async_trait]
impl RemoteApi for InMemoryRemote {
    async fn schema(&self) -> Result<Schema, RemoteError> {
        let mut state = self.state();
        state.calls.schema += 1;
        if state.fail_schema {
            return Err(unavailable());
        }
        Ok(state.schema.clone())
    }

    async fn query(
        &self,
        filter: Option<&QueryFilter>,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<QueryPage, RemoteError> {
        let mut state = self.state();
        state.calls.query += 1;
        if state.fail_queries {
            return Err(unavailable());
        }
        let matching: Vec<&RemotePage> = state
            .pages
            .iter()
            .filter(|page| match filter {
                Some(filter) => page
                    .property(&filter.property)
                    .is_some_and(|v| v.as_text() == filter.equals),
                None => true,
            })
            .collect();
        let start = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let end = (start + page_size.max(1)).min(matching.len());
        let records = matching
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|p| (*p).clone())
            .collect();
        let has_more = end < matching.len();
        Ok(QueryPage {
            records,
            has_more,
            next_cursor: has_more.then(|| end.to_string()),
        })
    }

    async fn get_record(&self, id: &str) -> Result<Option<RemotePage>, RemoteError> {
        let mut state = self.state();
        state.calls.get += 1;
        if state.fail_queries {
            return Err(unavailable());
        }
        Ok(state.pages.iter().find(|p| p.id == id).cloned())
    }

    async fn create_record(&self, properties: &Properties) -> Result<String, RemoteError> {
        let mut state = self.state();
        state.calls.create += 1;
        if state.fail_creates {
            return Err(unavailable());
        }
        let id = Uuid::new_v4().to_string();
        state.pages.push(RemotePage {
            id: id.clone(),
            properties: properties.clone(),
        });
        Ok(id)
    }

    async fn update_record(&self, id: &str, properties: &Properties) -> UpdateStatus {
        let mut state = self.state();
        state.calls.update += 1;
        if let Some(status) = state
            .scripted_updates
            .get_mut(id)
            .and_then(VecDeque::pop_front)
        {
            return status;
        }
        match state.pages.iter_mut().find(|p| p.id == id) {
            Some(page) => {
                page.properties
                    .extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
                UpdateStatus::Ok
            }
            None => UpdateStatus::NotFound,
        }
    }
}
