//! Deployment planner: turns a stage into a dependency-ordered list of contracts.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    catalog::{Catalog, StageTag},
    error::DeployError,
    types::{ContractName, ContractSpec, InitializationStep},
};

/// One contract to deploy, with its initialization sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub spec: ContractSpec,
    pub steps: Vec<InitializationStep>,
}

/// Ordered deployments for a stage.
///
/// Every contract appears after all contracts it references by address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub stage: StageTag,
    pub entries: Vec<PlanEntry>,
}

impl StagePlan {
    pub fn contract_names(&self) -> Vec<&ContractName> {
        self.entries.iter().map(|entry| &entry.spec.name).collect()
    }

    pub fn position(&self, name: &ContractName) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.spec.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Plans stages over a catalog.
pub struct Planner<'a> {
    catalog: &'a Catalog,
}

impl<'a> Planner<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    pub fn plan(&self, stage: &StageTag) -> Result<StagePlan, DeployError> {
        let members = self.stage_members(stage)?;
        let graph = self.dependency_graph(members)?;
        let order = topological_order(&graph).map_err(|cycle| {
            DeployError::CyclicDependency(
                cycle
                    .into_iter()
                    .map(|idx| self.catalog.contracts[idx].name.clone())
                    .collect(),
            )
        })?;

        let entries = order
            .into_iter()
            .map(|idx| {
                let spec = self.catalog.contracts[idx].clone();
                let steps = spec
                    .init
                    .iter()
                    .enumerate()
                    .map(|(i, action)| InitializationStep {
                        contract: spec.name.clone(),
                        index: i + 1,
                        action: *action,
                    })
                    .collect();
                PlanEntry { spec, steps }
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            stage = %stage,
            order = ?entries.iter().map(|e| e.spec.name.as_str()).collect::<Vec<_>>(),
            "Stage planned"
        );

        Ok(StagePlan {
            stage: stage.clone(),
            entries,
        })
    }

    /// Declaration indices of the contracts a stage names.
    fn stage_members(&self, stage: &StageTag) -> Result<Vec<usize>, DeployError> {
        match stage {
            StageTag::Full => Ok((0..self.catalog.contracts.len()).collect()),
            StageTag::Named(name) => {
                let def = self
                    .catalog
                    .find_stage(name)
                    .ok_or_else(|| DeployError::UnknownStage(name.clone()))?;
                def.contracts.iter().map(|c| self.index_of(c)).collect()
            }
        }
    }

    fn index_of(&self, name: &ContractName) -> Result<usize, DeployError> {
        self.catalog
            .position(name)
            .ok_or_else(|| DeployError::UnknownContract(name.clone()))
    }

    /// Close `members` over their dependencies and map each node to the nodes it depends on.
    fn dependency_graph(
        &self,
        members: Vec<usize>,
    ) -> Result<BTreeMap<usize, BTreeSet<usize>>, DeployError> {
        let mut graph = BTreeMap::new();
        let mut pending = members;

        while let Some(idx) = pending.pop() {
            if graph.contains_key(&idx) {
                continue;
            }
            let spec = &self.catalog.contracts[idx];
            let mut deps = BTreeSet::new();
            for dep in spec.dependencies() {
                let dep_idx = self.index_of(dep)?;
                deps.insert(dep_idx);
                pending.push(dep_idx);
            }
            graph.insert(idx, deps);
        }

        Ok(graph)
    }
}

/// Kahn's algorithm, always taking the lowest declaration index among ready nodes.
///
/// On failure returns a cycle as a closed path (first node repeated at the end).
fn topological_order(graph: &BTreeMap<usize, BTreeSet<usize>>) -> Result<Vec<usize>, Vec<usize>> {
    let mut remaining: BTreeMap<usize, usize> =
        graph.iter().map(|(&node, deps)| (node, deps.len())).collect();
    let mut ready: BTreeSet<usize> = remaining
        .iter()
        .filter(|&(_, &count)| count == 0)
        .map(|(&node, _)| node)
        .collect();
    let mut order = Vec::with_capacity(graph.len());

    while let Some(node) = ready.pop_first() {
        remaining.remove(&node);
        order.push(node);
        for (&dependent, deps) in graph {
            if !deps.contains(&node) {
                continue;
            }
            if let Some(count) = remaining.get_mut(&dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if remaining.is_empty() {
        return Ok(order);
    }

    // Every leftover node still depends on another leftover node, so walking those edges
    // must revisit a node.
    let mut path: Vec<usize> = Vec::new();
    let mut current = *remaining.keys().next().unwrap_or(&0);
    loop {
        if let Some(start) = path.iter().position(|&n| n == current) {
            let mut cycle = path.split_off(start);
            cycle.push(current);
            return Err(cycle);
        }
        path.push(current);
        match graph[&current].iter().find(|dep| remaining.contains_key(dep)) {
            Some(&next) => current = next,
            None => return Err(path),
        }
    }
}
