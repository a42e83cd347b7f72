//! State directory management.
//!
//! The CLI keeps everything the engine needs between runs in one directory:
//!
//! ```text
//! <state_dir>/
//! ├─ LOCK          # Advisory lock, one cardsync process at a time
//! └─ state.json    # Contacts, connections, mappings, conflicts, imports
//! ```

use cardsync_engine::{
    CardDavConnector, MemoryContactStore, MemorySyncStore, StoredContact, SyncConfig, SyncEngine,
    SyncSnapshot,
};
use cardsync_security::{CredentialVault, VaultKey};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const LOCK_FILE: &str = "LOCK";
const STATE_FILE: &str = "state.json";
const STATE_TEMP: &str = "state.json.tmp";

/// Engine type used by every command.
pub type Engine = SyncEngine<CardDavConnector, MemorySyncStore, MemoryContactStore>;

/// Errors opening or saving the state directory.
#[derive(Debug, Error)]
pub enum StateError {
    /// Another process holds the lock.
    #[error("state directory {0} is in use by another cardsync process")]
    Locked(PathBuf),

    /// The path exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The command needs the vault key and none was given.
    #[error("vault key required: pass --key or set CARDSYNC_VAULT_KEY")]
    MissingKey,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `state.json` could not be parsed.
    #[error("invalid state file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;

/// On-disk contents of `state.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    /// Local contacts.
    #[serde(default)]
    pub contacts: Vec<StoredContact>,
    /// Connections and sync bookkeeping.
    #[serde(default)]
    pub sync: SyncSnapshot,
}

/// An opened, exclusively locked state directory.
#[derive(Debug)]
pub struct StateDir {
    path: PathBuf,
    _lock_file: File,
}

impl StateDir {
    /// Opens the directory, creating it if needed, and takes the lock.
    ///
    /// Fails with [`StateError::Locked`] instead of waiting when another
    /// process holds it.
    pub fn open(path: &Path) -> StateResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(StateError::NotADirectory(path.to_path_buf()));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StateError::Locked(path.to_path_buf()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Path to `state.json`.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.path.join(STATE_FILE)
    }

    /// Loads the state. A missing or empty file is an empty state.
    pub fn load(&self) -> StateResult<StateFile> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(StateFile::default());
        }
        let data = fs::read(&path)?;
        if data.is_empty() {
            return Ok(StateFile::default());
        }
        Ok(serde_json::from_slice(&data)?)
    }

    /// Writes the state with write-then-rename so a crash never leaves a
    /// truncated file behind.
    pub fn save(&self, state: &StateFile) -> StateResult<()> {
        let temp_path = self.path.join(STATE_TEMP);
        let data = serde_json::to_vec_pretty(state)?;

        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.state_path())?;
        tracing::debug!(path = %self.state_path().display(), bytes = data.len(), "state saved");
        Ok(())
    }
}

/// A locked state directory with an engine loaded from it.
pub struct Workspace {
    dir: StateDir,
    engine: Engine,
    has_key: bool,
}

impl Workspace {
    /// Opens the state directory and builds the engine over its contents.
    ///
    /// Without a key the vault gets a throwaway one: commands that never
    /// touch passwords still work, and [`Workspace::require_key`] stops the
    /// rest.
    pub fn open(path: &Path, key: Option<VaultKey>, config: SyncConfig) -> StateResult<Self> {
        let dir = StateDir::open(path)?;
        let state = dir.load()?;
        let has_key = key.is_some();
        let vault = CredentialVault::new(key.unwrap_or_else(VaultKey::generate));
        let engine = SyncEngine::new(
            config,
            CardDavConnector,
            MemorySyncStore::from_snapshot(state.sync),
            MemoryContactStore::from_contacts(state.contacts),
            vault,
        );
        tracing::debug!(path = %path.display(), "workspace opened");
        Ok(Self {
            dir,
            engine,
            has_key,
        })
    }

    /// The engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Fails unless a vault key was supplied.
    pub fn require_key(&self) -> StateResult<()> {
        if self.has_key {
            Ok(())
        } else {
            Err(StateError::MissingKey)
        }
    }

    /// Writes the engine's current state back to disk.
    pub fn save(&self) -> StateResult<()> {
        self.dir.save(&StateFile {
            contacts: self.engine.contacts().snapshot(),
            sync: self.engine.store().snapshot(),
        })
    }
}
