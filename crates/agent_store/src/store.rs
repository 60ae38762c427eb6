use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::StoreError;
use crate::paths::{blob_file_name, validate_segment};
use crate::schema::{Envelope, STORE_VERSION};

/// One opaque blob per `(session, key)`.
pub trait KeyValueStore: Send {
    /// Returns `None` when nothing was stored under `key`.
    fn load(&self, session: &str, key: &str) -> Result<Option<Value>, StoreError>;

    fn save(&self, session: &str, key: &str, value: &Value) -> Result<(), StoreError>;

    fn remove(&self, session: &str, key: &str) -> Result<(), StoreError>;

    /// Keys stored for `session`, sorted.
    fn keys(&self, session: &str) -> Result<Vec<String>, StoreError>;
}

/// Fresh random session identifier.
#[must_use]
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Loads and decodes a typed blob; a shape mismatch is reported as corrupt.
pub fn load_as<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    session: &str,
    key: &str,
) -> Result<Option<T>, StoreError> {
    store
        .load(session, key)?
        .map(|value| {
            serde_json::from_value(value).map_err(|source| StoreError::corrupt(session, key, source))
        })
        .transpose()
}

pub fn save_as<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    session: &str,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(value).map_err(|source| StoreError::Serialize {
        key: key.to_string(),
        source,
    })?;
    store.save(session, key, &value)
}

/// Store backed by one JSON file per blob under `<root>/<session>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session: &str) -> Result<PathBuf, StoreError> {
        validate_segment(session)?;
        Ok(self.root.join(session))
    }

    fn blob_path(&self, session: &str, key: &str) -> Result<PathBuf, StoreError> {
        validate_segment(key)?;
        Ok(self.session_dir(session)?.join(blob_file_name(key)))
    }
}

impl KeyValueStore for FileStore {
    fn load(&self, session: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.blob_path(session, key)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::io("reading blob", &path, source)),
        };

        let envelope = serde_json::from_str::<Envelope>(&text)
            .map_err(|source| StoreError::corrupt(session, key, source))?;
        validate_envelope(session, key, &envelope)?;
        Ok(Some(envelope.value))
    }

    fn save(&self, session: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        let path = self.blob_path(session, key)?;
        let dir = self.session_dir(session)?;
        fs::create_dir_all(&dir)
            .map_err(|source| StoreError::io("creating session directory", &dir, source))?;

        let envelope = envelope_now(value.clone())?;
        let text = serde_json::to_string_pretty(&envelope).map_err(|source| {
            StoreError::Serialize {
                key: key.to_string(),
                source,
            }
        })?;

        // Staged write, then rename over the live blob.
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, text)
            .map_err(|source| StoreError::io("writing blob", &staging, source))?;
        fs::rename(&staging, &path)
            .map_err(|source| StoreError::io("replacing blob", &path, source))
    }

    fn remove(&self, session: &str, key: &str) -> Result<(), StoreError> {
        let path = self.blob_path(session, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::io("removing blob", &path, source)),
        }
    }

    fn keys(&self, session: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.session_dir(session)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::io("listing session directory", &dir, source)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|source| StoreError::io("listing session directory", &dir, source))?;
            let name = entry.file_name();
            if let Some(key) = name.to_str().and_then(|name| name.strip_suffix(".json")) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-process store; clones share the same blobs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<Mutex<BTreeMap<(String, String), Envelope>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw envelope, for inspecting timestamps and versions.
    #[must_use]
    pub fn envelope(&self, session: &str, key: &str) -> Option<Envelope> {
        lock_unpoisoned(&self.blobs)
            .get(&(session.to_string(), key.to_string()))
            .cloned()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, session: &str, key: &str) -> Result<Option<Value>, StoreError> {
        validate_segment(session)?;
        validate_segment(key)?;
        Ok(self.envelope(session, key).map(|envelope| envelope.value))
    }

    fn save(&self, session: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        validate_segment(session)?;
        validate_segment(key)?;
        let envelope = envelope_now(value.clone())?;
        lock_unpoisoned(&self.blobs).insert((session.to_string(), key.to_string()), envelope);
        Ok(())
    }

    fn remove(&self, session: &str, key: &str) -> Result<(), StoreError> {
        lock_unpoisoned(&self.blobs).remove(&(session.to_string(), key.to_string()));
        Ok(())
    }

    fn keys(&self, session: &str) -> Result<Vec<String>, StoreError> {
        Ok(lock_unpoisoned(&self.blobs)
            .keys()
            .filter(|(owner, _)| owner == session)
            .map(|(_, key)| key.clone())
            .collect())
    }
}

fn envelope_now(value: Value) -> Result<Envelope, StoreError> {
    Ok(Envelope {
        version: STORE_VERSION,
        saved_at: now_rfc3339()?,
        value,
    })
}

fn validate_envelope(session: &str, key: &str, envelope: &Envelope) -> Result<(), StoreError> {
    if envelope.version != STORE_VERSION {
        return Err(StoreError::UnsupportedVersion {
            session: session.to_string(),
            key: key.to_string(),
            found: envelope.version,
        });
    }

    if OffsetDateTime::parse(&envelope.saved_at, &Rfc3339).is_err() {
        return Err(StoreError::InvalidTimestamp {
            session: session.to_string(),
            key: key.to_string(),
            value: envelope.saved_at.clone(),
        });
    }

    Ok(())
}

fn now_rfc3339() -> Result<String, StoreError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(StoreError::ClockFormat)
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
