//! Durable persistence of user records.
//!
//! The backing medium is pluggable; the default is a single versioned JSON
//! file written atomically (temp file + rename), so a crash mid-save never
//! leaves data the next startup cannot parse. Unreadable or corrupt data
//! degrades to an empty tracker with a warning rather than refusing to start.
//!
//! No cross-process locking: this store assumes a single writer of record.

use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{UserId, UserRecord},
    Result,
};

const STORE_VERSION: u32 = 1;

/// On-disk document. Users are sorted by id so repeated saves of the same
/// state produce identical bytes.
#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    users: Vec<UserRecord>,
}

/// Result of loading the backing data at startup.
pub struct Loaded {
    pub users: HashMap<UserId, UserRecord>,
    /// Set when the backing data existed but could not be used; the tracker
    /// starts fresh and the caller decides how loudly to report it.
    pub warning: Option<String>,
}

pub trait Store: Send + Sync {
    fn load(&self) -> Result<Loaded>;
    fn save(&self, users: &HashMap<UserId, UserRecord>) -> Result<()>;
}

/// JSON file store. The whole state is rewritten on every save; fine for the
/// user counts this tracker is built for.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut os = self.path.clone().into_os_string();
        os.push(".tmp");
        PathBuf::from(os)
    }
}

impl Store for JsonFileStore {
    fn load(&self) -> Result<Loaded> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Loaded {
                    users: HashMap::new(),
                    warning: None,
                });
            }
            Err(e) => {
                return Ok(Loaded {
                    users: HashMap::new(),
                    warning: Some(format!(
                        "could not read {}: {e}; starting fresh",
                        self.path.display()
                    )),
                });
            }
        };

        if raw.trim().is_empty() {
            return Ok(Loaded {
                users: HashMap::new(),
                warning: None,
            });
        }

        match serde_json::from_str::<StoreFile>(&raw) {
            Ok(file) => Ok(Loaded {
                users: file
                    .users
                    .into_iter()
                    .map(|r| (r.user_id, r))
                    .collect(),
                warning: None,
            }),
            Err(e) => Ok(Loaded {
                users: HashMap::new(),
                warning: Some(format!(
                    "corrupt data in {}: {e}; starting fresh",
                    self.path.display()
                )),
            }),
        }
    }

    fn save(&self, users: &HashMap<UserId, UserRecord>) -> Result<()> {
        let mut sorted: Vec<UserRecord> = users.values().cloned().collect();
        sorted.sort_by_key(|r| r.user_id);

        let file = StoreFile {
            version: STORE_VERSION,
            users: sorted,
        };
        let bytes = serde_json::to_vec_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // All-or-nothing swap: a crash before the rename leaves the previous
        // file intact, a crash after leaves the new one.
        let tmp = self.tmp_path();
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-process store. Used by tests and by hosts that prefer losing state on
/// restart over failing requests when the disk is unavailable.
#[derive(Default)]
pub struct MemoryStore {
    users: std::sync::Mutex<HashMap<UserId, UserRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn load(&self) -> Result<Loaded> {
        Ok(Loaded {
            users: self.users.lock().expect("memory store poisoned").clone(),
            warning: None,
        })
    }

    fn save(&self, users: &HashMap<UserId, UserRecord>) -> Result<()> {
        *self.users.lock().expect("memory store poisoned") = users.clone();
        Ok(())
    }
}
