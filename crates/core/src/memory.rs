//! In-memory [`DriveApi`] for tests
//!
//! Evaluates [`Query`] clauses against a flat object table kept in
//! insertion order, paginates with offset tokens, and lets tests inject
//! failures and abuse flags.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::query::{Clause, FOLDER_MIME_TYPE, Query};
use crate::traits::{ContainerId, DriveApi, ListPage, RemoteObject};

#[derive(Debug, Clone)]
struct Entry {
    object: RemoteObject,
    content: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct State {
    entries: Vec<Entry>,
    next_id: u64,
    abuse_flagged: HashSet<String>,
    list_failures: VecDeque<Error>,
    upload_failures: VecDeque<Error>,
    download_failures: VecDeque<Error>,
    folders_created: usize,
    uploads: usize,
    deletes: usize,
    download_attempts: Vec<bool>,
}

impl State {
    fn allocate(
        &mut self,
        parent: &ContainerId,
        title: &str,
        mime: &str,
        content: Option<Vec<u8>>,
    ) -> RemoteObject {
        self.next_id += 1;
        let object = RemoteObject {
            id: format!("obj-{}", self.next_id),
            title: title.to_string(),
            mime_type: mime.to_string(),
            size: content.as_ref().map(|c| c.len() as u64),
            parents: vec![parent.as_str().to_string()],
            trashed: false,
        };
        self.entries.push(Entry {
            object: object.clone(),
            content,
        });
        object
    }
}

/// Thread-safe fake remote store
#[derive(Debug, Default)]
pub struct MemoryDrive {
    state: Mutex<State>,
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed an object directly, bypassing counters
    pub fn insert(
        &self,
        parent: &ContainerId,
        title: &str,
        mime_type: &str,
        content: Option<Vec<u8>>,
    ) -> RemoteObject {
        self.state().allocate(parent, title, mime_type, content)
    }

    /// Seed a plain file
    pub fn insert_file(&self, parent: &ContainerId, title: &str, content: &[u8]) -> RemoteObject {
        self.insert(parent, title, "application/octet-stream", Some(content.to_vec()))
    }

    pub fn trash(&self, id: &str) {
        if let Some(entry) = self.state().entries.iter_mut().find(|e| e.object.id == id) {
            entry.object.trashed = true;
        }
    }

    /// Live objects titled `title` directly under `parent`
    pub fn find_live(&self, parent: &ContainerId, title: &str) -> Vec<RemoteObject> {
        self.state()
            .entries
            .iter()
            .filter(|e| {
                !e.object.trashed
                    && e.object.title == title
                    && e.object.parents.iter().any(|p| p == parent.as_str())
            })
            .map(|e| e.object.clone())
            .collect()
    }

    pub fn content(&self, id: &str) -> Option<Vec<u8>> {
        self.state()
            .entries
            .iter()
            .find(|e| e.object.id == id)
            .and_then(|e| e.content.clone())
    }

    /// Downloads of `id` fail with the abuse condition unless acknowledged
    pub fn flag_abuse(&self, id: &str) {
        self.state().abuse_flagged.insert(id.to_string());
    }

    pub fn fail_next_list(&self, err: Error) {
        self.state().list_failures.push_back(err);
    }

    pub fn fail_next_upload(&self, err: Error) {
        self.state().upload_failures.push_back(err);
    }

    pub fn fail_next_download(&self, err: Error) {
        self.state().download_failures.push_back(err);
    }

    pub fn folders_created(&self) -> usize {
        self.state().folders_created
    }

    pub fn uploads(&self) -> usize {
        self.state().uploads
    }

    pub fn deletes(&self) -> usize {
        self.state().deletes
    }

    /// Acknowledge flag of every download attempt, in order
    pub fn download_attempts(&self) -> Vec<bool> {
        self.state().download_attempts.clone()
    }
}

fn matches(object: &RemoteObject, query: &Query) -> bool {
    query.clauses().iter().all(|clause| match clause {
        Clause::InParents(id) => object.parents.iter().any(|p| p == id.as_str()),
        Clause::TitleEq(title) => object.title == *title,
        Clause::MimeTypeEq(mime) => object.mime_type == *mime,
        Clause::Trashed(trashed) => object.trashed == *trashed,
    })
}

#[async_trait]
impl DriveApi for MemoryDrive {
    async fn list_children(
        &self,
        query: &Query,
        page_token: Option<String>,
        page_size: u32,
    ) -> Result<ListPage> {
        let mut state = self.state();
        if let Some(err) = state.list_failures.pop_front() {
            return Err(err);
        }

        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| Error::Transient(format!("invalid page token '{token}'")))?,
            None => 0,
        };

        let matching: Vec<RemoteObject> = state
            .entries
            .iter()
            .filter(|e| matches(&e.object, query))
            .map(|e| e.object.clone())
            .collect();

        let end = (offset + page_size as usize).min(matching.len());
        let items = matching.get(offset..end).unwrap_or_default().to_vec();
        let next_page_token = (end < matching.len()).then(|| end.to_string());

        Ok(ListPage {
            items,
            next_page_token,
        })
    }

    async fn create_folder(&self, parent: &ContainerId, title: &str) -> Result<RemoteObject> {
        let mut state = self.state();
        state.folders_created += 1;
        Ok(state.allocate(parent, title, FOLDER_MIME_TYPE, None))
    }

    async fn upload_file(
        &self,
        parent: &ContainerId,
        title: &str,
        source: &Path,
    ) -> Result<RemoteObject> {
        let failure = self.state().upload_failures.pop_front();
        if let Some(err) = failure {
            return Err(err);
        }
        let content = tokio::fs::read(source).await?;

        let mut state = self.state();
        state.uploads += 1;
        Ok(state.allocate(parent, title, "application/octet-stream", Some(content)))
    }

    async fn download(
        &self,
        id: &str,
        acknowledge_abuse: bool,
        sink: &mut tokio::fs::File,
    ) -> Result<u64> {
        let content = {
            let mut state = self.state();
            state.download_attempts.push(acknowledge_abuse);

            if !acknowledge_abuse && state.abuse_flagged.contains(id) {
                return Err(Error::AbuseFlagged(format!("download '{id}' failed: abuse")));
            }
            if let Some(err) = state.download_failures.pop_front() {
                return Err(err);
            }

            state
                .entries
                .iter()
                .find(|e| e.object.id == id && !e.object.trashed)
                .ok_or_else(|| Error::NotFound(format!("file '{id}'")))?
                .content
                .clone()
                .unwrap_or_default()
        };

        sink.write_all(&content).await?;
        sink.flush().await?;
        Ok(content.len() as u64)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        let before = state.entries.len();
        state.entries.retain(|e| e.object.id != id);
        if state.entries.len() == before {
            return Err(Error::NotFound(format!("file '{id}'")));
        }
        state.deletes += 1;
        Ok(())
    }
}
