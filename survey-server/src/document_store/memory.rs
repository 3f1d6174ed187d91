//! In-process document store
//!
//! Behaves like the GitHub backend (creating an existing path fails with
//! 422) and can be told to fail upcoming writes or reads.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{DocumentEntry, DocumentStore, DocumentStoreError};

/// Failure injected into the next `create_file` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// Non-success status (409 and 422 are conflicts)
    Status(u16),
    /// Transport failure before any status
    Network,
}

impl ScriptedFailure {
    fn into_error(self) -> DocumentStoreError {
        match self {
            ScriptedFailure::Status(status) => DocumentStoreError::Api {
                status,
                message: format!("scripted failure {}", status),
            },
            ScriptedFailure::Network => DocumentStoreError::Network("scripted network failure".into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failures: Mutex<VecDeque<ScriptedFailure>>,
    create_paths: Mutex<Vec<String>>,
    create_attempts: AtomicUsize,
    fail_reads: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue failures consumed one per `create_file` call, in order
    pub fn script_failures(&self, failures: impl IntoIterator<Item = ScriptedFailure>) {
        lock(&self.failures).extend(failures);
    }

    /// Make listing and fetching fail until reset
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Seed an object without counting a write attempt
    pub fn insert(&self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        lock(&self.objects).insert(path.into(), content.into());
    }

    /// Number of `create_file` calls so far, failed ones included
    pub fn create_attempts(&self) -> usize {
        self.create_attempts.load(Ordering::SeqCst)
    }

    /// Paths passed to `create_file`, one per call
    pub fn create_paths(&self) -> Vec<String> {
        lock(&self.create_paths).clone()
    }

    pub fn objects(&self) -> BTreeMap<String, Vec<u8>> {
        lock(&self.objects).clone()
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(path).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_reads(&self) -> Result<(), DocumentStoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DocumentStoreError::Api {
                status: 503,
                message: "scripted read failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create_file(
        &self,
        path: &str,
        _message: &str,
        content: &[u8],
    ) -> Result<(), DocumentStoreError> {
        self.create_attempts.fetch_add(1, Ordering::SeqCst);
        lock(&self.create_paths).push(path.to_string());

        if let Some(failure) = lock(&self.failures).pop_front() {
            return Err(failure.into_error());
        }

        let mut objects = lock(&self.objects);
        if objects.contains_key(path) {
            return Err(DocumentStoreError::Api {
                status: 422,
                message: format!("{} already exists", path),
            });
        }
        objects.insert(path.to_string(), content.to_vec());
        Ok(())
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<DocumentEntry>, DocumentStoreError> {
        self.check_reads()?;
        let dir = format!("{}/", prefix.trim_end_matches('/'));

        Ok(lock(&self.objects)
            .keys()
            .filter_map(|path| {
                let name = path.strip_prefix(&dir)?;
                // Direct children only
                (!name.contains('/')).then(|| DocumentEntry {
                    path: path.clone(),
                    name: name.to_string(),
                })
            })
            .collect())
    }

    async fn fetch_file(&self, path: &str) -> Result<Vec<u8>, DocumentStoreError> {
        self.check_reads()?;
        self.get(path)
            .ok_or_else(|| DocumentStoreError::NotFound(path.to_string()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
