use crate::types::push::StoredSubscription;

use serde_json::value::RawValue;
use thiserror::Error;
use time::OffsetDateTime;

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read subscriptions file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write subscriptions file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed subscriptions file: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("subscription store lock poisoned")]
    Poisoned,
}

/// Push subscriptions keyed by user id, one record per user.
///
/// With a backing file every upsert rewrites the whole file; without one
/// records live for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionStore {
    records: Arc<Mutex<HashMap<String, StoredSubscription>>>,
    path: Option<PathBuf>,
}

impl SubscriptionStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let records = match std::fs::read(path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => HashMap::new(),
            Ok(bytes) => {
                let list: Vec<StoredSubscription> = serde_json::from_slice(&bytes)?;
                list.into_iter()
                    .map(|record| (record.user_id.clone(), record))
                    .collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => {
                return Err(StoreError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        tracing::info!(path = %path.display(), count = records.len(), "loaded push subscriptions");
        Ok(Self {
            records: Arc::new(Mutex::new(records)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Inserts or replaces the user's descriptor. A replaced record keeps
    /// its original `created_at`. On a failed write the previous state is
    /// restored.
    pub fn upsert(
        &self,
        user_id: &str,
        subscription: Box<RawValue>,
        now: OffsetDateTime,
    ) -> Result<StoredSubscription, StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        let created_at = records
            .get(user_id)
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        let record = StoredSubscription {
            user_id: user_id.to_string(),
            subscription,
            created_at,
        };
        let previous = records.insert(user_id.to_string(), record.clone());

        if let Err(err) = self.persist(&records) {
            match previous {
                Some(previous) => records.insert(user_id.to_string(), previous),
                None => records.remove(user_id),
            };
            return Err(err);
        }
        Ok(record)
    }

    pub fn get(&self, user_id: &str) -> Result<Option<StoredSubscription>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(user_id).cloned())
    }

    fn persist(&self, records: &HashMap<String, StoredSubscription>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut list: Vec<&StoredSubscription> = records.values().collect();
        list.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        let bytes = serde_json::to_vec(&list)?;
        write_atomic(path, &bytes).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })
    }
}

/// Writes to a sibling temp file and renames it over `path`, so readers and
/// restarts only ever see a complete file.
fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("subscriptions.json");
    let pid = std::process::id();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    for attempt in 0..10u32 {
        let temp_path = parent.join(format!(".{file_name}.tmp-{pid}-{nanos}-{attempt}"));
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        };
        let written = file
            .write_all(contents)
            .and_then(|()| file.sync_all())
            .and_then(|()| std::fs::rename(&temp_path, path));
        if written.is_err() {
            let _ = std::fs::remove_file(&temp_path);
        }
        return written;
    }

    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        "failed to create temp file",
    ))
}
