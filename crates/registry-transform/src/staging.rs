//! Durable ordered key-value staging for one import run.
//!
//! Backed by rocksdb with one column family per namespace, so a fresh
//! run can drop everything at once and the consolidation scan walks
//! keys in order. Scratch space only; never served to clients.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Mutex;

use anyhow::anyhow;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;

use registry_core::error::{RegistryError, Result};
use registry_core::model::{BaseRecord, BranchRecord, PartnerRecord, TaxRecord};

use crate::merge::{self, MergeFn};

/// Staging namespaces. `Companies` is keyed by full key (one entry per
/// branch); the rest are keyed by the 8-digit base key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Companies,
    Base,
    Partners,
    Taxes,
}

impl Namespace {
    pub const ALL: [Namespace; 4] = [
        Namespace::Companies,
        Namespace::Base,
        Namespace::Partners,
        Namespace::Taxes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Companies => "companies",
            Namespace::Base => "base",
            Namespace::Partners => "partners",
            Namespace::Taxes => "taxes",
        }
    }
}

// Write serialization is per key, not per store: concurrent readers of
// different source files only contend when they hit the same stripe.
const LOCK_STRIPES: usize = 64;

pub struct StagingStore {
    db: DB,
    locks: Vec<Mutex<()>>,
}

impl StagingStore {
    /// Opens a fresh staging directory for a new import run, discarding
    /// anything a previous run left behind.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if dir.exists() {
            std::fs::remove_dir_all(dir)
                .map_err(|e| anyhow!("could not reset staging dir {dir:?}: {e}"))?;
        }
        Self::open(dir)
    }

    /// Reopens an existing staging directory (consolidation phase).
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);
        let cfs = Namespace::ALL
            .iter()
            .map(|ns| ColumnFamilyDescriptor::new(ns.as_str(), Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&options, dir, cfs)
            .map_err(|e| RegistryError::Internal(anyhow!(e)))?;
        let locks = (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect();
        Ok(Self { db, locks })
    }

    fn cf(&self, ns: Namespace) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(ns.as_str())
            .ok_or_else(|| anyhow!("missing column family {}", ns.as_str()).into())
    }

    fn stripe(&self, ns: Namespace, key: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        ns.as_str().hash(&mut hasher);
        key.hash(&mut hasher);
        &self.locks[hasher.finish() as usize % LOCK_STRIPES]
    }

    /// Reads the current value for the key, applies the caller-supplied
    /// merge function and writes the result back. The read-merge-write
    /// is serialized per key so no concurrent writer loses an update.
    pub fn write(
        &self,
        ns: Namespace,
        key: &str,
        incoming: &[u8],
        merge: MergeFn,
    ) -> Result<()> {
        let cf = self.cf(ns)?;
        let guard = self.stripe(ns, key);
        let _held = guard
            .lock()
            .map_err(|_| anyhow!("poisoned staging lock for {}/{key}", ns.as_str()))?;
        let current = self
            .db
            .get_cf(cf, key)
            .map_err(|e| RegistryError::Internal(anyhow!(e)))?;
        let merged = merge(current.as_deref(), incoming).map_err(|e| {
            RegistryError::Corruption {
                namespace: ns.as_str(),
                key: key.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.db
            .put_cf(cf, key, merged)
            .map_err(|e| RegistryError::Internal(anyhow!(e)))
    }

    pub fn read(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(ns)?;
        self.db
            .get_cf(cf, key)
            .map_err(|e| RegistryError::Internal(anyhow!(e)))
    }

    /// Lazy ordered scan of every key in a namespace.
    pub fn keys(
        &self,
        ns: Namespace,
    ) -> Result<impl Iterator<Item = Result<String>> + '_> {
        let cf = self.cf(ns)?;
        Ok(self.db.iterator_cf(cf, IteratorMode::Start).map(|entry| {
            entry
                .map(|(k, _)| String::from_utf8_lossy(&k).into_owned())
                .map_err(|e| RegistryError::Internal(anyhow!(e)))
        }))
    }

    /// Lazy ordered scan of every entry in a namespace.
    pub fn entries(
        &self,
        ns: Namespace,
    ) -> Result<impl Iterator<Item = Result<(String, Vec<u8>)>> + '_> {
        let cf = self.cf(ns)?;
        Ok(self.db.iterator_cf(cf, IteratorMode::Start).map(|entry| {
            entry
                .map(|(k, v)| (String::from_utf8_lossy(&k).into_owned(), v.into_vec()))
                .map_err(|e| RegistryError::Internal(anyhow!(e)))
        }))
    }

    // ── typed staging helpers ─────────────────────────────────────

    pub fn stage_branch(&self, full_key: &str, row: &BranchRecord) -> Result<()> {
        self.write(Namespace::Companies, full_key, &encode(row)?, merge::replace)
    }

    pub fn stage_base(&self, base_key: &str, row: &BaseRecord) -> Result<()> {
        self.write(Namespace::Base, base_key, &encode(row)?, merge::replace)
    }

    pub fn stage_partner(&self, base_key: &str, row: &PartnerRecord) -> Result<()> {
        self.write(
            Namespace::Partners,
            base_key,
            &encode(row)?,
            merge::merge_partners,
        )
    }

    pub fn stage_taxes(&self, base_key: &str, row: &TaxRecord) -> Result<()> {
        self.write(Namespace::Taxes, base_key, &encode(row)?, merge::replace)
    }

    pub fn base_of(&self, base_key: &str) -> Result<Option<BaseRecord>> {
        self.read_typed(Namespace::Base, base_key)
    }

    /// Staged partner sequence in first-observation order; a base key
    /// without partners is an empty sequence, not an error.
    pub fn partners_of(&self, base_key: &str) -> Result<Vec<PartnerRecord>> {
        Ok(self
            .read_typed(Namespace::Partners, base_key)?
            .unwrap_or_default())
    }

    pub fn taxes_of(&self, base_key: &str) -> Result<Option<TaxRecord>> {
        self.read_typed(Namespace::Taxes, base_key)
    }

    fn read_typed<T: DeserializeOwned>(
        &self,
        ns: Namespace,
        key: &str,
    ) -> Result<Option<T>> {
        match self.read(ns, key)? {
            Some(bytes) => decode(ns, key, &bytes).map(Some),
            None => Ok(None),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| RegistryError::Internal(anyhow!(e)))
}

/// Decoding a staged value must never fail silently: bad bytes mean the
/// store no longer holds what the merge engine wrote.
pub(crate) fn decode<T: DeserializeOwned>(
    ns: Namespace,
    key: &str,
    bytes: &[u8],
) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| RegistryError::Corruption {
        namespace: ns.as_str(),
        key: key.to_string(),
        reason: e.to_string(),
    })
}
