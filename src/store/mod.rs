//! JSON object store for users, generated test sets, and submissions.
//!
//! The document is a flat JSON object keyed `"<Class>.<id>"`; every value
//! carries a `"__class__"` tag. The store is an explicit value owned by the
//! application state. Objects sit behind a `tokio::sync::RwLock` and every
//! mutation persists the whole document while the write lock is held, so
//! saves never interleave.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::data::BlobClient;
use crate::domain::{Generate, Submission, User};
use crate::error::AppError;

/// One persisted entity, tagged by class name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__class__")]
pub enum StoredObject {
    User(User),
    Generate(Generate),
    Submission(Submission),
}

impl StoredObject {
    pub fn class(&self) -> &'static str {
        match self {
            StoredObject::User(_) => "User",
            StoredObject::Generate(_) => "Generate",
            StoredObject::Submission(_) => "Submission",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            StoredObject::User(u) => &u.id,
            StoredObject::Generate(g) => &g.id,
            StoredObject::Submission(s) => &s.id,
        }
    }

    pub fn key(&self) -> String {
        object_key(self.class(), self.id())
    }
}

impl From<User> for StoredObject {
    fn from(value: User) -> Self {
        StoredObject::User(value)
    }
}

impl From<Generate> for StoredObject {
    fn from(value: Generate) -> Self {
        StoredObject::Generate(value)
    }
}

impl From<Submission> for StoredObject {
    fn from(value: Submission) -> Self {
        StoredObject::Submission(value)
    }
}

pub fn object_key(class: &str, id: &str) -> String {
    format!("{class}.{id}")
}

/// The in-memory object set with its query functions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Objects {
    entries: BTreeMap<String, StoredObject>,
}

impl Objects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a store document.
    ///
    /// Entries that fail to deserialize (unknown class, wrong field types) are
    /// skipped with a warning; a document that is not a JSON object is an error.
    pub fn from_json(bytes: &[u8]) -> Result<Self, AppError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::new());
        }
        let raw: BTreeMap<String, Value> = serde_json::from_slice(bytes)
            .map_err(|e| AppError::storage(format!("Store document is not a JSON object: {e}")))?;

        let mut entries = BTreeMap::new();
        for (key, value) in raw {
            match StoredObject::deserialize(value) {
                Ok(obj) => {
                    if obj.key() != key {
                        debug!(%key, actual = %obj.key(), "Store key does not match object; re-keying");
                    }
                    entries.insert(obj.key(), obj);
                }
                Err(e) => warn!(%key, error = %e, "Skipping malformed store entry"),
            }
        }
        Ok(Self { entries })
    }

    pub fn to_json(&self) -> Result<Vec<u8>, AppError> {
        serde_json::to_vec(&self.entries).map_err(|e| AppError::storage(format!("Failed to serialize store: {e}")))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace by key.
    pub fn insert(&mut self, obj: impl Into<StoredObject>) {
        let obj = obj.into();
        self.entries.insert(obj.key(), obj);
    }

    pub fn remove(&mut self, class: &str, id: &str) -> Option<StoredObject> {
        self.entries.remove(&object_key(class, id))
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        match self.entries.get(&object_key("User", id)) {
            Some(StoredObject::User(u)) => Some(u),
            _ => None,
        }
    }

    pub fn generate(&self, id: &str) -> Option<&Generate> {
        match self.entries.get(&object_key("Generate", id)) {
            Some(StoredObject::Generate(g)) => Some(g),
            _ => None,
        }
    }

    pub fn submission(&self, id: &str) -> Option<&Submission> {
        match self.entries.get(&object_key("Submission", id)) {
            Some(StoredObject::Submission(s)) => Some(s),
            _ => None,
        }
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.entries.values().filter_map(|o| match o {
            StoredObject::User(u) => Some(u),
            _ => None,
        })
    }

    pub fn generates(&self) -> impl Iterator<Item = &Generate> {
        self.entries.values().filter_map(|o| match o {
            StoredObject::Generate(g) => Some(g),
            _ => None,
        })
    }

    pub fn submissions(&self) -> impl Iterator<Item = &Submission> {
        self.entries.values().filter_map(|o| match o {
            StoredObject::Submission(s) => Some(s),
            _ => None,
        })
    }

    /// First user (oldest) with this email.
    pub fn find_user_by_email(&self, email: &str) -> Option<&User> {
        self.users().filter(|u| u.email == email).min_by_key(|u| u.created_at)
    }

    /// Test sets generated for a user, oldest first.
    pub fn find_generates_by_user(&self, user_id: &str) -> Vec<&Generate> {
        let mut out: Vec<&Generate> = self.generates().filter(|g| g.user_id == user_id).collect();
        out.sort_by_key(|g| g.created_at);
        out
    }

    /// Submissions against a test set, oldest first.
    pub fn find_submissions_by_generate(&self, generate_id: &str) -> Vec<&Submission> {
        let mut out: Vec<&Submission> = self.submissions().filter(|s| s.generate_id == generate_id).collect();
        out.sort_by_key(|s| s.created_at);
        out
    }
}

/// Where the store document lives.
#[derive(Debug, Clone)]
pub enum Backend {
    File(PathBuf),
    Blob { client: BlobClient, name: String },
    Memory,
}

impl Backend {
    fn describe(&self) -> String {
        match self {
            Backend::File(path) => format!("file '{}'", path.display()),
            Backend::Blob { name, .. } => format!("blob '{name}'"),
            Backend::Memory => "memory".to_string(),
        }
    }
}

/// Persistent object store.
#[derive(Debug)]
pub struct ObjectStore {
    backend: Backend,
    objects: RwLock<Objects>,
}

impl ObjectStore {
    /// Open a store and load its current document.
    pub async fn open(backend: Backend) -> Result<Self, AppError> {
        let objects = load(&backend).await?;
        info!(backend = %backend.describe(), objects = objects.len(), "Object store loaded");
        Ok(Self {
            backend,
            objects: RwLock::new(objects),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory,
            objects: RwLock::new(Objects::new()),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Objects> {
        self.objects.read().await
    }

    /// Apply a mutation and persist the result under the same write lock.
    ///
    /// If persisting fails the in-memory change is rolled back.
    pub async fn update<R>(&self, f: impl FnOnce(&mut Objects) -> R) -> Result<R, AppError> {
        let mut guard = self.objects.write().await;
        let before = guard.clone();
        let out = f(&mut *guard);
        if let Err(e) = save(&self.backend, &guard).await {
            *guard = before;
            return Err(e);
        }
        Ok(out)
    }

    pub async fn put(&self, obj: impl Into<StoredObject>) -> Result<(), AppError> {
        let obj = obj.into();
        self.update(|objects| objects.insert(obj)).await
    }

    /// Remove an object; `Ok(false)` when it did not exist.
    pub async fn delete(&self, class: &str, id: &str) -> Result<bool, AppError> {
        self.update(|objects| objects.remove(class, id).is_some()).await
    }
}

async fn load(backend: &Backend) -> Result<Objects, AppError> {
    match backend {
        Backend::File(path) => match tokio::fs::read(path).await {
            Ok(bytes) => Objects::from_json(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No store document yet; starting empty");
                Ok(Objects::new())
            }
            Err(e) => Err(AppError::storage(format!("Failed to read store '{}': {e}", path.display()))),
        },
        Backend::Blob { client, name } => match client.get(name).await? {
            Some(bytes) => Objects::from_json(&bytes),
            None => {
                info!(blob = %name, "No store blob yet; starting empty");
                Ok(Objects::new())
            }
        },
        Backend::Memory => Ok(Objects::new()),
    }
}

async fn save(backend: &Backend, objects: &Objects) -> Result<(), AppError> {
    match backend {
        Backend::File(path) => {
            let bytes = objects.to_json()?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AppError::storage(format!("Failed to create '{}': {e}", parent.display())))?;
            }
            // Write then rename so a crash never leaves a truncated document.
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, bytes)
                .await
                .map_err(|e| AppError::storage(format!("Failed to write store '{}': {e}", tmp.display())))?;
            tokio::fs::rename(&tmp, path)
                .await
                .map_err(|e| AppError::storage(format!("Failed to replace store '{}': {e}", path.display())))
        }
        Backend::Blob { client, name } => client.put(name, objects.to_json()?, "application/json").await,
        Backend::Memory => Ok(()),
    }
}
