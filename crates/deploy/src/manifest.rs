//! Deployment manifest: what a run touched and where each contract ended up.

use std::{collections::BTreeMap, path::Path};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use serde::{Deserialize, Serialize};

use crate::types::{ContractName, DeploymentRecord, TxReceipt};

/// Lifecycle of one contract within a run.
///
/// `Pending -> Deployed -> Initializing -> Initialized`, with `DeploymentFailed` reachable from
/// `Pending` and `InitializationFailed` from `Initializing`. A contract without initialization
/// steps ends at `Deployed`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EntryState {
    Pending,
    Deployed,
    Initializing,
    Initialized,
    DeploymentFailed,
    InitializationFailed,
}

impl EntryState {
    pub fn can_transition_to(self, next: EntryState) -> bool {
        use EntryState::*;
        matches!(
            (self, next),
            (Pending, Deployed)
                | (Pending, DeploymentFailed)
                | (Deployed, Initializing)
                | (Initializing, Initialized)
                | (Initializing, InitializationFailed)
        )
    }

    pub fn is_failed(self) -> bool {
        matches!(self, Self::DeploymentFailed | Self::InitializationFailed)
    }
}

/// Manifest entry for a single contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub state: EntryState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<DeploymentRecord>,
    /// The record predates this run.
    #[serde(default)]
    pub reused: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_receipts: Vec<TxReceipt>,
    /// 1-based index of the failed initialization step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,
}

/// Result of an orchestrator run, kept even when the run stops early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentManifest {
    pub network: String,
    pub stage: String,
    /// Contracts in the order they were processed.
    pub order: Vec<ContractName>,
    pub entries: BTreeMap<ContractName, ManifestEntry>,
}

impl DeploymentManifest {
    pub fn new(network: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            stage: stage.into(),
            order: Vec::new(),
            entries: BTreeMap::new(),
        }
    }

    /// Register a contract as `Pending`.
    pub(crate) fn begin(&mut self, contract: &ContractName) {
        self.order.push(contract.clone());
        self.entries.insert(
            contract.clone(),
            ManifestEntry {
                state: EntryState::Pending,
                record: None,
                reused: false,
                init_receipts: Vec::new(),
                failed_step: None,
            },
        );
    }

    /// Move a contract to `next`, returning its entry for further updates.
    pub(crate) fn advance(
        &mut self,
        contract: &ContractName,
        next: EntryState,
    ) -> Option<&mut ManifestEntry> {
        let entry = self.entries.get_mut(contract)?;
        debug_assert!(
            entry.state.can_transition_to(next),
            "invalid transition {} -> {next} for {contract}",
            entry.state
        );
        tracing::debug!(contract = %contract, from = %entry.state, to = %next, "State change");
        entry.state = next;
        Some(entry)
    }

    pub fn entry(&self, contract: &ContractName) -> Option<&ManifestEntry> {
        self.entries.get(contract)
    }

    pub fn record(&self, contract: &ContractName) -> Option<&DeploymentRecord> {
        self.entries.get(contract)?.record.as_ref()
    }

    /// Addresses of every contract that has a record in this manifest.
    pub fn addresses(&self) -> BTreeMap<ContractName, Address> {
        self.entries
            .iter()
            .filter_map(|(name, entry)| Some((name.clone(), entry.record.as_ref()?.address)))
            .collect()
    }

    /// Records in processing order.
    pub fn records(&self) -> impl Iterator<Item = &DeploymentRecord> {
        self.order.iter().filter_map(|name| self.record(name))
    }

    pub fn has_failures(&self) -> bool {
        self.entries.values().any(|entry| entry.state.is_failed())
    }

    /// Render as a table for terminal output.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_header(vec!["Contract", "State", "Address", "Transaction", "Reused"]);

        for name in &self.order {
            let Some(entry) = self.entries.get(name) else {
                continue;
            };
            let (address, tx) = entry
                .record
                .as_ref()
                .map(|r| (r.address.to_string(), r.transaction_hash.to_string()))
                .unwrap_or_default();
            let state = match entry.failed_step {
                Some(step) => format!("{} (step {step})", entry.state),
                None => entry.state.to_string(),
            };
            table.add_row(vec![
                name.to_string(),
                state,
                address,
                tx,
                if entry.reused { "yes" } else { "no" }.to_string(),
            ]);
        }

        table
    }

    /// Write the manifest as pretty JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize manifest to JSON")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write manifest to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Manifest saved");
        Ok(())
    }
}
