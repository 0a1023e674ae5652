//! Persistent data-object store.
//!
//! A flat key/value store mapping `(applet id, object id, namespace)` to an
//! opaque byte string. The Secure namespace holds the password files; it is
//! kept distinct so an implementation may encrypt it at rest, the core only
//! treats it as a separate key space.
//!
//! State persists as JSON with base64-encoded blobs, written through a temp
//! file so a crash leaves either the old or the new content on disk.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::buffer::ByteBuffer;
use crate::errors::Error;

/// Identifier of an applet owning stored objects.
pub type AppId = u16;
/// Identifier of a stored object within an applet.
pub type ObjectId = u16;

/// Well-known applet ids.
pub struct AppletId;

impl AppletId {
    pub const OPENPGP: AppId = 0x0001;
}

/// Largest byte string a single object may hold.
pub const MAX_OBJECT_SIZE: usize = 2048;

/// Object namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    /// Regular data objects, addressed by the GET DATA / PUT DATA tag.
    File,
    /// Reserved for the password files (PW1, PW3).
    Secure,
}

/// Custom serde module for base64 encoding of byte vectors
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if bytes.is_empty() {
            serializer.serialize_str("")
        } else {
            serializer.serialize_str(&STANDARD.encode(bytes))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(Vec::new());
        }
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// On-disk representation of a single object.
#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    app: AppId,
    id: ObjectId,
    ns: Namespace,
    #[serde(with = "base64_bytes")]
    data: Vec<u8>,
}

/// The persistent key/value store behind all data objects.
pub struct FileSystem {
    state_file: Option<PathBuf>,
    files: HashMap<(AppId, ObjectId, Namespace), Vec<u8>>,
}

impl FileSystem {
    const STATE_FILE: &'static str = "filesystem.json";

    /// Get the default storage directory
    fn default_storage_dir() -> PathBuf {
        // Check environment variable first
        if let Ok(path) = std::env::var("PGTOKEN_STORAGE_DIR") {
            return PathBuf::from(path);
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".pgtoken");
        }
        PathBuf::from("/var/lib/pgtoken")
    }

    /// Create a store rooted at `storage_dir` (default directory when None)
    /// and load any existing state.
    pub fn open(storage_dir: Option<PathBuf>) -> Self {
        let dir = storage_dir.unwrap_or_else(Self::default_storage_dir);
        let mut fs = Self {
            state_file: Some(dir.join(Self::STATE_FILE)),
            files: HashMap::new(),
        };
        fs.load();
        fs
    }

    /// Create a store that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            state_file: None,
            files: HashMap::new(),
        }
    }

    /// Load state from storage.
    ///
    /// Returns true if existing state was loaded.
    pub fn load(&mut self) -> bool {
        let Some(path) = &self.state_file else {
            return false;
        };
        if !path.exists() {
            info!("no existing card state at {:?}, starting empty", path);
            return false;
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Vec<FileEntry>>(&content) {
                Ok(entries) => {
                    self.files = entries
                        .into_iter()
                        .map(|e| ((e.app, e.id, e.ns), e.data))
                        .collect();
                    info!("loaded {} objects from {:?}", self.files.len(), path);
                    true
                }
                Err(e) => {
                    warn!("failed to parse card state: {}", e);
                    false
                }
            },
            Err(e) => {
                warn!("failed to read card state file: {}", e);
                false
            }
        }
    }

    /// Persist the current state.
    fn save(&self) -> Result<(), Error> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };

        let mut entries: Vec<FileEntry> = self
            .files
            .iter()
            .map(|(&(app, id, ns), data)| FileEntry {
                app,
                id,
                ns,
                data: data.clone(),
            })
            .collect();
        entries.sort_by_key(|e| (e.app, e.ns as u8, e.id));

        let json = serde_json::to_string_pretty(&entries).map_err(|e| {
            warn!("failed to serialize card state: {}", e);
            Error::InternalError
        })?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| {
                warn!("failed to create storage directory: {}", e);
                Error::InternalError
            })?;
        }

        // Write through a temp file so a crash cannot leave a torn state.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .and_then(|()| fs::rename(&tmp, path))
            .map_err(|e| {
                warn!("failed to write card state: {}", e);
                Error::InternalError
            })?;

        debug!("saved {} objects to {:?}", self.files.len(), path);
        Ok(())
    }

    /// Read an object, appending its contents to `out`. Missing objects
    /// yield empty content, not an error.
    pub fn read_file(
        &self,
        app: AppId,
        id: ObjectId,
        ns: Namespace,
        out: &mut ByteBuffer,
    ) -> Result<(), Error> {
        out.append(self.read(app, id, ns))
    }

    /// Borrow an object's contents; empty when the object does not exist.
    pub fn read(&self, app: AppId, id: ObjectId, ns: Namespace) -> &[u8] {
        self.files
            .get(&(app, id, ns))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replace an object's contents and persist.
    pub fn write_file(
        &mut self,
        app: AppId,
        id: ObjectId,
        ns: Namespace,
        data: &[u8],
    ) -> Result<(), Error> {
        if data.len() > MAX_OBJECT_SIZE {
            return Err(Error::WrongApduDataLength);
        }
        self.files.insert((app, id, ns), data.to_vec());
        self.save()
    }
}
