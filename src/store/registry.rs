//! Shared store handles.
//!
//! Sled holds an exclusive lock on its directory, so every coordinator
//! attaching to one location must share a single open database. The registry
//! hands out one `StoreHandle` per canonical location for as long as anyone
//! holds it.

use crate::error::StorageError;
use crate::store::{ObjectStore, SledObjectStore};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};
use tracing::debug;

/// An open store plus the lock serializing commits against it.
pub struct StoreHandle {
    location: PathBuf,
    store: Box<dyn ObjectStore>,
    commit_lock: Mutex<()>,
}

impl StoreHandle {
    pub fn new(location: PathBuf, store: Box<dyn ObjectStore>) -> Self {
        Self {
            location,
            store,
            commit_lock: Mutex::new(()),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    /// Held for the whole read-resolve-write cycle of a commit.
    pub fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock()
    }
}

fn registry() -> &'static Mutex<HashMap<PathBuf, Weak<StoreHandle>>> {
    static OPEN_STORES: OnceLock<Mutex<HashMap<PathBuf, Weak<StoreHandle>>>> = OnceLock::new();
    OPEN_STORES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Open the sled store at `location`, or share the handle already open there.
///
/// The parent directory must exist.
pub fn open_shared(location: &Path) -> Result<Arc<StoreHandle>, StorageError> {
    let key = canonical_location(location)?;
    let mut open = registry().lock();
    if let Some(handle) = open.get(&key).and_then(Weak::upgrade) {
        debug!(location = %key.display(), "Sharing open store");
        return Ok(handle);
    }

    let store = SledObjectStore::new(&key)?;
    let handle = Arc::new(StoreHandle::new(key.clone(), Box::new(store)));
    open.retain(|_, weak| weak.strong_count() > 0);
    open.insert(key.clone(), Arc::downgrade(&handle));
    debug!(location = %key.display(), "Opened store");
    Ok(handle)
}

/// Canonical form of a store location whose last component may not exist yet.
fn canonical_location(location: &Path) -> Result<PathBuf, StorageError> {
    let file_name = location
        .file_name()
        .ok_or_else(|| StorageError::InvalidPath(format!("{} has no file name", location.display())))?;
    let parent = match location.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let parent = dunce::canonicalize(&parent).map_err(|e| {
        StorageError::InvalidPath(format!("Failed to canonicalize {}: {}", parent.display(), e))
    })?;
    Ok(parent.join(file_name))
}
