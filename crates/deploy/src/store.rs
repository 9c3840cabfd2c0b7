//! Persisted deployment records, keyed by `(network, contract)`.

use std::{
    collections::HashMap,
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use anyhow::{Context, Result};
use fs2::FileExt;

use crate::types::{ContractName, DeploymentRecord};

/// Key-value store of deployment records.
///
/// `put` replaces whatever record was stored for the same `(network, contract)`;
/// records are never merged.
pub trait DeploymentStore {
    fn get(&self, network: &str, contract: &ContractName) -> Result<Option<DeploymentRecord>>;

    fn put(&self, record: &DeploymentRecord) -> Result<()>;

    /// All records for a network, sorted by contract name.
    fn records(&self, network: &str) -> Result<Vec<DeploymentRecord>>;
}

impl<T: DeploymentStore + ?Sized> DeploymentStore for &T {
    fn get(&self, network: &str, contract: &ContractName) -> Result<Option<DeploymentRecord>> {
        (**self).get(network, contract)
    }

    fn put(&self, record: &DeploymentRecord) -> Result<()> {
        (**self).put(record)
    }

    fn records(&self, network: &str) -> Result<Vec<DeploymentRecord>> {
        (**self).records(network)
    }
}

/// In-memory store, used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(String, ContractName), DeploymentRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records, e.g. to dry-run against a real deployment history.
    pub fn from_records(records: impl IntoIterator<Item = DeploymentRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| ((record.network.clone(), record.contract.clone()), record))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }
}

impl DeploymentStore for MemoryStore {
    fn get(&self, network: &str, contract: &ContractName) -> Result<Option<DeploymentRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .get(&(network.to_string(), contract.clone()))
            .cloned())
    }

    fn put(&self, record: &DeploymentRecord) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(
            (record.network.clone(), record.contract.clone()),
            record.clone(),
        );
        Ok(())
    }

    fn records(&self, network: &str) -> Result<Vec<DeploymentRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<_> = records
            .iter()
            .filter(|((net, _), _)| net == network)
            .map(|(_, record)| record.clone())
            .collect();
        found.sort_by(|a, b| a.contract.cmp(&b.contract));
        Ok(found)
    }
}

/// Name of the lock file guarding writes inside a network directory.
const LOCK_FILENAME: &str = ".lock";

/// JSON file store using the hardhat-deploy layout: `<root>/<network>/<Contract>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn network_dir(&self, network: &str) -> PathBuf {
        self.root.join(network)
    }

    fn record_path(&self, network: &str, contract: &ContractName) -> PathBuf {
        self.network_dir(network).join(format!("{contract}.json"))
    }

    fn read_record(path: &Path) -> Result<DeploymentRecord> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployment record {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse deployment record {}", path.display()))
    }
}

impl DeploymentStore for JsonFileStore {
    fn get(&self, network: &str, contract: &ContractName) -> Result<Option<DeploymentRecord>> {
        let path = self.record_path(network, contract);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_record(&path).map(Some)
    }

    fn put(&self, record: &DeploymentRecord) -> Result<()> {
        let dir = self.network_dir(&record.network);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create deployments directory {}", dir.display()))?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILENAME))
            .context("Failed to open deployments lock file")?;
        lock.lock_exclusive()
            .context("Failed to lock deployments directory")?;

        let path = self.record_path(&record.network, &record.contract);
        let tmp_path = path.with_extension("json.tmp");
        let json =
            serde_json::to_string_pretty(record).context("Failed to serialize deployment record")?;

        let written = std::fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))
            .and_then(|()| {
                std::fs::rename(&tmp_path, &path)
                    .with_context(|| format!("Failed to replace {}", path.display()))
            });

        FileExt::unlock(&lock).context("Failed to unlock deployments directory")?;
        written?;

        tracing::debug!(
            contract = %record.contract,
            network = %record.network,
            path = %path.display(),
            "Deployment record saved"
        );
        Ok(())
    }

    fn records(&self, network: &str) -> Result<Vec<DeploymentRecord>> {
        let dir = self.network_dir(network);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                records.push(Self::read_record(&path)?);
            }
        }
        records.sort_by(|a, b| a.contract.cmp(&b.contract));
        Ok(records)
    }
}
