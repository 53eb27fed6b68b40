//! In-memory stand-ins for the remote service, for tests.

use crate::HarnessError;
use crate::client::RodsClient;
use crate::meta::MetaTarget;
use crate::session::{Connect, Connection};
use rods_types::{Avu, RodsPath};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use walkdir::WalkDir;

/// A [RodsClient] over an in-memory namespace.
///
/// Honours the same contracts as the icommands-backed client:
/// tolerant creation and removal, admin-gated group operations, and
/// additive metadata with exact-duplicate suppression.
pub struct InMemoryRods {
    admin: bool,
    fail_path_removals: AtomicBool,
    inner: Mutex<Store>,
}

#[derive(Default)]
struct Store {
    entries: BTreeMap<String, Entry>,
    groups: BTreeSet<String>,
}

enum Entry {
    Collection { avus: BTreeSet<Avu> },
    DataObject { data: Vec<u8>, avus: BTreeSet<Avu> },
}

impl Entry {
    fn collection() -> Entry {
        Entry::Collection {
            avus: BTreeSet::new(),
        }
    }

    fn data_object(data: Vec<u8>) -> Entry {
        Entry::DataObject {
            data,
            avus: BTreeSet::new(),
        }
    }
}

impl InMemoryRods {
    /// An empty namespace whose user has admin capability.
    pub fn new() -> InMemoryRods {
        InMemoryRods {
            admin: true,
            fail_path_removals: AtomicBool::new(false),
            inner: Mutex::new(Store::default()),
        }
    }

    /// An empty namespace whose user lacks admin capability.
    pub fn without_admin() -> InMemoryRods {
        InMemoryRods {
            admin: false,
            fail_path_removals: AtomicBool::new(false),
            inner: Mutex::new(Store::default()),
        }
    }

    /// Make every subsequent [rm](RodsClient::rm) call fail, even
    /// with force. Group removal is unaffected.
    pub fn fail_path_removals(&self) {
        self.fail_path_removals.store(true, Ordering::Relaxed);
    }

    pub fn exists(&self, path: &RodsPath) -> bool {
        self.lock().entries.contains_key(path.as_str())
    }

    pub fn is_collection(&self, path: &RodsPath) -> bool {
        matches!(
            self.lock().entries.get(path.as_str()),
            Some(Entry::Collection { .. })
        )
    }

    /// The content of the data object at `path`, if there is one.
    pub fn object_bytes(&self, path: &RodsPath) -> Option<Vec<u8>> {
        match self.lock().entries.get(path.as_str()) {
            Some(Entry::DataObject { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// The AVUs attached to `path`, in their stored order.
    pub fn avus(&self, path: &RodsPath) -> Vec<Avu> {
        match self.lock().entries.get(path.as_str()) {
            Some(Entry::Collection { avus }) => avus.iter().cloned().collect(),
            Some(Entry::DataObject { avus, .. }) => avus.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.lock().groups.contains(name)
    }

    /// Every path at or under `path`, sorted.
    pub fn paths_under(&self, path: &RodsPath) -> Vec<String> {
        let prefix = format!("{}/", path.as_str());
        self.lock()
            .entries
            .keys()
            .filter(|k| *k == path.as_str() || k.starts_with(&prefix))
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.inner.lock().expect("store lock poisoned")
    }

    fn meta_add(&self, target: MetaTarget<'_>, avus: &[Avu]) -> Result<(), HarnessError> {
        let mut store = self.lock();
        let entry = store
            .entries
            .get_mut(target.path().as_str())
            .ok_or_else(|| HarnessError::metadata(target.path(), "does not exist"))?;

        match (target, entry) {
            (MetaTarget::Collection(_), Entry::Collection { avus: existing })
            | (MetaTarget::DataObject(_), Entry::DataObject { avus: existing, .. }) => {
                for avu in avus {
                    existing.insert(avu.clone());
                }
                Ok(())
            }
            (MetaTarget::Collection(path), _) => {
                Err(HarnessError::metadata(path, "not a collection"))
            }
            (MetaTarget::DataObject(path), _) => {
                Err(HarnessError::metadata(path, "not a data object"))
            }
        }
    }

    fn put_file(&self, local: &Path, remote: &RodsPath) -> Result<(), HarnessError> {
        let mut store = self.lock();

        let dest = match store.entries.get(remote.as_str()) {
            Some(Entry::Collection { .. }) => {
                let name = local
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| HarnessError::transfer(remote, "source has no usable name"))?;
                remote
                    .join(name)
                    .map_err(|err| HarnessError::transfer(remote, err.to_string()))?
            }
            _ => remote.clone(),
        };
        if let Some(parent) = dest.parent()
            && parent.as_str() != "/"
            && !matches!(
                store.entries.get(parent.as_str()),
                Some(Entry::Collection { .. })
            )
        {
            return Err(HarnessError::transfer(&dest, "no such collection"));
        }
        if let Some(Entry::Collection { .. }) = store.entries.get(dest.as_str()) {
            return Err(HarnessError::transfer(&dest, "target is a collection"));
        }

        let data =
            std::fs::read(local).map_err(|err| HarnessError::transfer(&dest, err.to_string()))?;
        store
            .entries
            .insert(dest.as_str().to_string(), Entry::data_object(data));

        Ok(())
    }

    fn put_tree(&self, local: &Path, remote: &RodsPath) -> Result<(), HarnessError> {
        {
            let store = self.lock();
            if !matches!(
                store.entries.get(remote.as_str()),
                Some(Entry::Collection { .. })
            ) {
                return Err(HarnessError::transfer(remote, "no such collection"));
            }
        }

        let name = local
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| HarnessError::transfer(remote, "source has no usable name"))?;
        let base = remote
            .join(name)
            .map_err(|err| HarnessError::transfer(remote, err.to_string()))?;

        for entry in WalkDir::new(local) {
            let entry = entry.map_err(|err| HarnessError::transfer(remote, err.to_string()))?;
            let rel = entry
                .path()
                .strip_prefix(local)
                .map_err(|err| HarnessError::transfer(remote, err.to_string()))?;
            let dest = if rel.as_os_str().is_empty() {
                base.clone()
            } else {
                let rel = rel
                    .to_str()
                    .ok_or_else(|| HarnessError::transfer(remote, "source has no usable name"))?;
                base.join(rel)
                    .map_err(|err| HarnessError::transfer(remote, err.to_string()))?
            };

            let mut store = self.lock();
            if entry.file_type().is_dir() {
                store
                    .entries
                    .entry(dest.as_str().to_string())
                    .or_insert_with(Entry::collection);
            } else {
                let data = std::fs::read(entry.path())
                    .map_err(|err| HarnessError::transfer(&dest, err.to_string()))?;
                store
                    .entries
                    .insert(dest.as_str().to_string(), Entry::data_object(data));
            }
        }

        Ok(())
    }
}

impl Default for InMemoryRods {
    fn default() -> Self {
        InMemoryRods::new()
    }
}

impl RodsClient for InMemoryRods {
    fn mkdir(&self, path: &RodsPath, make_parents: bool) -> Result<(), HarnessError> {
        let mut store = self.lock();

        match store.entries.get(path.as_str()) {
            Some(Entry::Collection { .. }) => {
                return if make_parents {
                    Ok(())
                } else {
                    Err(HarnessError::creation(path, "already exists"))
                };
            }
            Some(Entry::DataObject { .. }) => {
                return Err(HarnessError::creation(path, "not a collection"));
            }
            None => {}
        }

        let mut missing = Vec::new();
        let mut ancestor = path.parent();
        while let Some(p) = ancestor {
            if p.as_str() == "/" {
                break;
            }
            match store.entries.get(p.as_str()) {
                Some(Entry::Collection { .. }) => break,
                Some(Entry::DataObject { .. }) => {
                    return Err(HarnessError::creation(&p, "not a collection"));
                }
                None => {
                    if !make_parents {
                        return Err(HarnessError::creation(
                            path,
                            "parent collection does not exist",
                        ));
                    }
                    ancestor = p.parent();
                    missing.push(p);
                }
            }
        }
        for p in missing {
            store
                .entries
                .insert(p.as_str().to_string(), Entry::collection());
        }
        store
            .entries
            .insert(path.as_str().to_string(), Entry::collection());

        Ok(())
    }

    fn rm(&self, path: &RodsPath, force: bool, recursive: bool) -> Result<(), HarnessError> {
        if self.fail_path_removals.load(Ordering::Relaxed) {
            return Err(HarnessError::removal(path, "SYS_INTERNAL_ERR"));
        }
        let mut store = self.lock();
        let prefix = format!("{}/", path.as_str());

        match store.entries.get(path.as_str()) {
            None => {
                return if force {
                    Ok(())
                } else {
                    Err(HarnessError::removal(path, "does not exist"))
                };
            }
            Some(Entry::Collection { .. }) => {
                if !recursive && store.entries.keys().any(|k| k.starts_with(&prefix)) {
                    return Err(HarnessError::removal(path, "collection is not empty"));
                }
            }
            Some(Entry::DataObject { .. }) => {}
        }
        store
            .entries
            .retain(|k, _| k != path.as_str() && !k.starts_with(&prefix));

        Ok(())
    }

    fn put(&self, local: &Path, remote: &RodsPath, recursive: bool) -> Result<(), HarnessError> {
        if local.is_file() {
            self.put_file(local, remote)
        } else if local.is_dir() {
            if !recursive {
                return Err(HarnessError::transfer(remote, "source is a directory"));
            }
            self.put_tree(local, remote)
        } else {
            Err(HarnessError::transfer(remote, "local path does not exist"))
        }
    }

    fn mkgroup(&self, name: &str) -> Result<(), HarnessError> {
        if !self.admin {
            return Err(HarnessError::creation(name, "CAT_INSUFFICIENT_PRIVILEGE_LEVEL"));
        }
        self.lock().groups.insert(name.to_string());

        Ok(())
    }

    fn rmgroup(&self, name: &str) -> Result<(), HarnessError> {
        if !self.admin {
            return Err(HarnessError::removal(name, "CAT_INSUFFICIENT_PRIVILEGE_LEVEL"));
        }
        self.lock().groups.remove(name);

        Ok(())
    }

    fn have_admin(&self) -> bool {
        self.admin
    }
}

/// [Connect] implementation against an [InMemoryRods] store.
#[derive(Clone)]
pub struct InMemoryConnector {
    store: Arc<InMemoryRods>,
    fail_connect: bool,
}

impl InMemoryConnector {
    pub fn new(store: Arc<InMemoryRods>) -> InMemoryConnector {
        InMemoryConnector {
            store,
            fail_connect: false,
        }
    }

    /// A connector whose connection attempts always fail.
    pub fn failing(store: Arc<InMemoryRods>) -> InMemoryConnector {
        InMemoryConnector {
            store,
            fail_connect: true,
        }
    }
}

impl Connect for InMemoryConnector {
    type Conn = InMemoryConnection;

    fn connect(&self) -> Result<InMemoryConnection, HarnessError> {
        if self.fail_connect {
            return Err(HarnessError::SessionStart(
                "connector configured to fail".to_string(),
            ));
        }

        Ok(InMemoryConnection {
            store: Arc::clone(&self.store),
        })
    }
}

/// A connection handed out by [InMemoryConnector].
pub struct InMemoryConnection {
    store: Arc<InMemoryRods>,
}

impl Connection for InMemoryConnection {
    fn meta_add(&mut self, target: MetaTarget<'_>, avus: &[Avu]) -> Result<(), HarnessError> {
        self.store.meta_add(target, avus)
    }

    fn shutdown(&mut self) {}
}
