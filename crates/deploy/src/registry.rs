//! Artifact registry: compiled contract interfaces plus prior deployment records.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use alloy_core::{json_abi::JsonAbi, primitives::Bytes};
use anyhow::Context;
use serde::Deserialize;

use crate::{
    error::DeployError,
    store::DeploymentStore,
    types::{ContractName, DeploymentRecord},
};

/// Compiled representation of a contract.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractInterface {
    pub creation_code: Bytes,
    pub abi: JsonAbi,
}

/// Source of compiled contract interfaces.
pub trait InterfaceProvider {
    /// Returns `None` when no artifact exists for `name`.
    fn interface(&self, name: &ContractName) -> anyhow::Result<Option<ContractInterface>>;
}

impl<T: InterfaceProvider + ?Sized> InterfaceProvider for &T {
    fn interface(&self, name: &ContractName) -> anyhow::Result<Option<ContractInterface>> {
        (**self).interface(name)
    }
}

/// In-memory interface provider.
#[derive(Debug, Clone, Default)]
pub struct StaticInterfaces {
    interfaces: HashMap<ContractName, ContractInterface>,
}

impl StaticInterfaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<ContractName>, interface: ContractInterface) -> Self {
        self.insert(name, interface);
        self
    }

    pub fn insert(&mut self, name: impl Into<ContractName>, interface: ContractInterface) {
        self.interfaces.insert(name.into(), interface);
    }
}

impl InterfaceProvider for StaticInterfaces {
    fn interface(&self, name: &ContractName) -> anyhow::Result<Option<ContractInterface>> {
        Ok(self.interfaces.get(name).cloned())
    }
}

/// Hardhat compilation artifact, as written to `artifacts/contracts/<File>.sol/<Name>.json`.
#[derive(Debug, Deserialize)]
struct HardhatArtifact {
    abi: JsonAbi,
    bytecode: Bytes,
}

/// Reads hardhat artifacts from a directory tree.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    root: PathBuf,
}

impl ArtifactDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locate `<name>.json` anywhere below the root, ignoring `.dbg.json` files.
    fn find_artifact(dir: &Path, file_name: &str) -> anyhow::Result<Option<PathBuf>> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read artifact directory {}", dir.display()))?;

        let mut subdirs = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                subdirs.push(path);
            } else if path.file_name().and_then(|n| n.to_str()) == Some(file_name) {
                return Ok(Some(path));
            }
        }

        subdirs.sort();
        for subdir in subdirs {
            if let Some(found) = Self::find_artifact(&subdir, file_name)? {
                return Ok(Some(found));
            }
        }

        Ok(None)
    }
}

impl InterfaceProvider for ArtifactDir {
    fn interface(&self, name: &ContractName) -> anyhow::Result<Option<ContractInterface>> {
        if !self.root.exists() {
            anyhow::bail!("Artifact directory not found: {}", self.root.display());
        }

        let Some(path) = Self::find_artifact(&self.root, &format!("{name}.json"))? else {
            return Ok(None);
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let artifact: HardhatArtifact = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        tracing::debug!(contract = %name, path = %path.display(), "Loaded artifact");

        Ok(Some(ContractInterface {
            creation_code: artifact.bytecode,
            abi: artifact.abi,
        }))
    }
}

/// Resolves contract names against compiled interfaces and the deployment store of one network.
pub struct ArtifactRegistry<P, S> {
    provider: P,
    store: S,
    network: String,
}

impl<P, S> ArtifactRegistry<P, S>
where
    P: InterfaceProvider,
    S: DeploymentStore,
{
    pub fn new(provider: P, store: S, network: impl Into<String>) -> Self {
        Self {
            provider,
            store,
            network: network.into(),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve a contract to its interface and existing deployment record, if any.
    pub fn resolve(
        &self,
        name: &ContractName,
    ) -> Result<(ContractInterface, Option<DeploymentRecord>), DeployError> {
        let interface = self
            .provider
            .interface(name)
            .map_err(|e| DeployError::InvalidArtifact {
                contract: name.clone(),
                reason: format!("{e:#}"),
            })?
            .ok_or_else(|| DeployError::UnknownContract(name.clone()))?;

        if interface.creation_code.is_empty() {
            return Err(DeployError::InvalidArtifact {
                contract: name.clone(),
                reason: "empty creation code (interface or abstract contract?)".to_string(),
            });
        }

        let existing = self.existing_record(name)?;
        Ok((interface, existing))
    }

    /// Look up the current deployment record without touching artifacts.
    pub fn existing_record(
        &self,
        name: &ContractName,
    ) -> Result<Option<DeploymentRecord>, DeployError> {
        self.store
            .get(&self.network, name)
            .map_err(DeployError::Store)
    }
}
