//! Persistence for the client-held session.
//!
//! The session lives as one JSON object under [`STORAGE_KEY`], mirroring a
//! browser's key/value storage. A corrupt entry is dropped on load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::authz::Principal;
use crate::client::error::ClientError;

pub const STORAGE_KEY: &str = "user";

/// Account snapshot plus bearer token, as returned by login/registration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSession {
    pub id: String,
    pub name: String,
    pub email: String,
    pub token: String,
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl Principal for ClientSession {
    fn principal_id(&self) -> &str {
        &self.id
    }

    fn principal_email(&self) -> &str {
        &self.email
    }
}

pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<ClientSession>, ClientError>;
    fn save(&self, session: &ClientSession) -> Result<(), ClientError>;
    fn clear(&self) -> Result<(), ClientError>;
}

fn decode_entry(raw: &str) -> Option<ClientSession> {
    match serde_json::from_str::<ClientSession>(raw) {
        Ok(session) if !session.token.is_empty() => Some(session),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "discarding unreadable session entry");
            None
        }
    }
}

/// In-process key/value storage.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a raw value under `key`, bypassing serialization.
    pub fn set_raw(&self, key: &str, raw: &str) {
        self.entries.lock().insert(key.to_string(), raw.to_string());
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> Result<Option<ClientSession>, ClientError> {
        let mut entries = self.entries.lock();
        let Some(raw) = entries.get(STORAGE_KEY) else {
            return Ok(None);
        };

        let session = decode_entry(raw);
        if session.is_none() {
            entries.remove(STORAGE_KEY);
        }
        Ok(session)
    }

    fn save(&self, session: &ClientSession) -> Result<(), ClientError> {
        let raw = serde_json::to_string(session)?;
        self.entries.lock().insert(STORAGE_KEY.to_string(), raw);
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        self.entries.lock().remove(STORAGE_KEY);
        Ok(())
    }
}

/// Key/value storage in a JSON file, so the session survives restarts.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Map<String, Value>, ClientError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(ClientError::Storage(e.to_string())),
        };

        match serde_json::from_str::<Map<String, Value>>(&text) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "session file is corrupt, starting empty");
                Ok(Map::new())
            }
        }
    }

    fn write_entries(&self, entries: &Map<String, Value>) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ClientError::Storage(e.to_string()))?;
        }

        // Write then rename so a crash never leaves half a file.
        let tmp = self.path.with_extension("tmp");
        let text = serde_json::to_string_pretty(entries)?;
        std::fs::write(&tmp, text).map_err(|e| ClientError::Storage(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| ClientError::Storage(e.to_string()))
    }
}

impl SessionStore for FileStore {
    fn load(&self) -> Result<Option<ClientSession>, ClientError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;

        let Some(value) = entries.get(STORAGE_KEY) else {
            return Ok(None);
        };

        let session = match value {
            Value::String(raw) => decode_entry(raw),
            other => decode_entry(&other.to_string()),
        };

        if session.is_none() {
            entries.remove(STORAGE_KEY);
            self.write_entries(&entries)?;
        }
        Ok(session)
    }

    fn save(&self, session: &ClientSession) -> Result<(), ClientError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        entries.insert(STORAGE_KEY.to_string(), serde_json::to_value(session)?);
        self.write_entries(&entries)
    }

    fn clear(&self) -> Result<(), ClientError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        if entries.remove(STORAGE_KEY).is_some() {
            self.write_entries(&entries)?;
        }
        Ok(())
    }
}
