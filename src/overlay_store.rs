//! Durable storage for the overlay collections.
//!
//! Each overlay collection lives under its own string key as a JSON
//! array. Reads never fail: an absent key, an unreadable environment or a value that
//! does not parse all come back as an empty collection. Writes replace the whole
//! value of one key inside a single LMDB write transaction, so a reader sees either
//! the previous array or the new one.
//!
//! There is no transaction spanning several keys. An engine that saves three
//! collections after a delete does three independent commits.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::RwLock;

use lmdb::{Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::app_response::AppResponse;

const OVERLAY_DB: &str = "overlay";

/// Storage keys of the overlay collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayKey {
    Products,
    AddedProducts,
    DeletedProductIds,
    Favorites,
    /// Ids of added products that only exist on this client.
    LocalProductIds,
}

impl OverlayKey {
    pub const ALL: [OverlayKey; 5] = [
        OverlayKey::Products,
        OverlayKey::AddedProducts,
        OverlayKey::DeletedProductIds,
        OverlayKey::Favorites,
        OverlayKey::LocalProductIds,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayKey::Products => "products",
            OverlayKey::AddedProducts => "addedProducts",
            OverlayKey::DeletedProductIds => "deletedProductIds",
            OverlayKey::Favorites => "favorites",
            OverlayKey::LocalProductIds => "localProductIds",
        }
    }
}

impl Display for OverlayKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key-value contract the reconciliation engine persists through.
///
/// Implementors only provide raw string access; [`OverlayStore::load`] and
/// [`OverlayStore::save`] layer the JSON encoding and the recovery policy on top.
pub trait OverlayStore {
    /// Raw stored value, `Ok(None)` when the key has never been written.
    fn read_raw(&self, key: OverlayKey) -> Result<Option<String>, AppResponse>;

    /// Replaces the raw value of `key`.
    fn write_raw(&self, key: OverlayKey, value: &str) -> Result<(), AppResponse>;

    /// Removes every overlay key.
    fn clear_all_records(&self) -> Result<(), AppResponse>;

    /// Loads a collection, falling back to an empty one on any problem.
    fn load<T>(&self, key: OverlayKey) -> Vec<T>
    where
        T: DeserializeOwned,
        Self: Sized,
    {
        let raw = match self.read_raw(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Could not read '{}' from overlay store: {}", key, e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<T>>(&raw) {
            Ok(items) => items,
            Err(e) => {
                let error = AppResponse::ParseError(format!("malformed '{}' value: {}", key, e));
                warn!("{}; using an empty collection", error);
                Vec::new()
            }
        }
    }

    /// Serializes the whole collection and replaces the stored value.
    fn save<T>(&self, key: OverlayKey, items: &[T]) -> Result<(), AppResponse>
    where
        T: Serialize,
        Self: Sized,
    {
        let json = serde_json::to_string(items)?;
        self.write_raw(key, &json)
    }
}

/// LMDB-backed overlay store.
///
/// The environment lives in the `<name>.lmdb` directory, created on first use.
pub struct AppDbState {
    env: Environment,
    db: Database,
    path: String,
}

impl AppDbState {
    /// Default LMDB map size, enough for a few thousand cached products.
    pub const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024;

    pub fn init(name: String) -> Result<Self, AppResponse> {
        Self::init_with_map_size(name, Self::DEFAULT_MAP_SIZE)
    }

    pub fn init_with_map_size(name: String, map_size: usize) -> Result<Self, AppResponse> {
        let path = format!("{name}.lmdb");
        std::fs::create_dir_all(&path)?;

        let env = Environment::new()
            .set_max_dbs(1)
            .set_map_size(map_size)
            .open(Path::new(&path))?;
        let db = env.create_db(Some(OVERLAY_DB), DatabaseFlags::empty())?;

        info!("Overlay store opened at {}", path);
        Ok(Self { env, db, path })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Forces buffered writes to disk.
    pub fn sync(&self) -> Result<(), AppResponse> {
        self.env.sync(true)?;
        Ok(())
    }
}

impl OverlayStore for AppDbState {
    fn read_raw(&self, key: OverlayKey) -> Result<Option<String>, AppResponse> {
        let txn = self.env.begin_ro_txn()?;
        let value = match txn.get(self.db, &key.as_str()) {
            Ok(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(AppResponse::from(e)),
        };
        txn.commit()?;
        Ok(value)
    }

    fn write_raw(&self, key: OverlayKey, value: &str) -> Result<(), AppResponse> {
        let mut txn = self.env.begin_rw_txn()?;
        txn.put(self.db, &key.as_str(), &value, WriteFlags::empty())?;
        txn.commit()?;
        Ok(())
    }

    fn clear_all_records(&self) -> Result<(), AppResponse> {
        let mut txn = self.env.begin_rw_txn()?;
        txn.clear_db(self.db)?;
        txn.commit()?;
        info!("Overlay store at {} cleared", self.path);
        Ok(())
    }
}

/// Volatile overlay store for hosts without a writable disk.
#[derive(Default)]
pub struct MemoryOverlayStore {
    values: RwLock<HashMap<OverlayKey, String>>,
}

impl MemoryOverlayStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OverlayStore for MemoryOverlayStore {
    fn read_raw(&self, key: OverlayKey) -> Result<Option<String>, AppResponse> {
        let values = self
            .values
            .read()
            .map_err(|_| AppResponse::DatabaseError("memory store lock poisoned".to_string()))?;
        Ok(values.get(&key).cloned())
    }

    fn write_raw(&self, key: OverlayKey, value: &str) -> Result<(), AppResponse> {
        let mut values = self
            .values
            .write()
            .map_err(|_| AppResponse::DatabaseError("memory store lock poisoned".to_string()))?;
        values.insert(key, value.to_string());
        Ok(())
    }

    fn clear_all_records(&self) -> Result<(), AppResponse> {
        let mut values = self
            .values
            .write()
            .map_err(|_| AppResponse::DatabaseError("memory store lock poisoned".to_string()))?;
        values.clear();
        Ok(())
    }
}
