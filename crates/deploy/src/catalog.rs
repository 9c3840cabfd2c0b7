//! Contract catalog: the deployable contracts and the stages that group them.

use alloy_core::primitives::{Address, U256, address};
use serde::{Deserialize, Serialize};

use crate::types::{ArgSlot, ContractName, ContractSpec, InitAction};

/// ERC-4337 EntryPoint v0.6, deployed at the same address on every supported network.
pub const DEFAULT_ENTRY_POINT: Address = address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

/// Stage name that selects every contract in the catalog.
pub const FULL_DEPLOYMENT_STAGE: &str = "Full-Deployment";

/// Seconds in one week, the unstake delay used for paymaster stakes.
pub const ONE_WEEK_SECS: u32 = 604_800;

/// Token paymaster with its fee token. Also selected by the `MakoShard` tag.
const TOKEN_PAYMASTER_STAGE: [&str; 2] = ["MakoShard", "TokenPaymaster"];

/// Subscription paymaster with its token and account factory. Also selected by the
/// `MakoEnergy` tag.
const SUBSCRIPTION_PAYMASTER_STAGE: [&str; 3] =
    ["MakoShard", "MakoAccountFactory", "SubscriptionPaymaster"];

const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;

/// Convert an amount expressed in tenths of an ether to wei.
pub const fn deci_ether(tenths: u64) -> U256 {
    U256::from_limbs([tenths * (WEI_PER_ETHER / 10), 0, 0, 0])
}

/// A named subset of contracts deployed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDef {
    pub name: String,
    pub contracts: Vec<ContractName>,
}

/// Selects which part of the catalog a run targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StageTag {
    /// Every contract in the catalog.
    Full,
    /// A named stage.
    Named(String),
}

impl std::str::FromStr for StageTag {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("full") || s == FULL_DEPLOYMENT_STAGE {
            Ok(Self::Full)
        } else {
            Ok(Self::Named(s.to_string()))
        }
    }
}

impl std::fmt::Display for StageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => f.write_str(FULL_DEPLOYMENT_STAGE),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// All deployable contracts, in declaration order, plus the named stages.
///
/// Declaration order is the tie-breaker for independent contracts when planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub contracts: Vec<ContractSpec>,
    #[serde(default)]
    pub stages: Vec<StageDef>,
}

impl Catalog {
    pub fn new(contracts: Vec<ContractSpec>) -> Self {
        Self {
            contracts,
            stages: Vec::new(),
        }
    }

    /// Add a named stage.
    pub fn stage<I, N>(mut self, name: impl Into<String>, contracts: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<ContractName>,
    {
        self.stages.push(StageDef {
            name: name.into(),
            contracts: contracts.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn get(&self, name: &ContractName) -> Option<&ContractSpec> {
        self.contracts.iter().find(|spec| &spec.name == name)
    }

    /// Declaration index of a contract.
    pub fn position(&self, name: &ContractName) -> Option<usize> {
        self.contracts.iter().position(|spec| &spec.name == name)
    }

    pub fn find_stage(&self, name: &str) -> Option<&StageDef> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    /// Stage names, with the full deployment last.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages
            .iter()
            .map(|stage| stage.name.as_str())
            .chain(std::iter::once(FULL_DEPLOYMENT_STAGE))
            .collect()
    }

    /// The Mako demo system: energy NFT, shard token, account factory and two paymasters.
    pub fn mako(entry_point: Address) -> Self {
        let initial_deposit = deci_ether(1);
        let paymaster_init = [
            InitAction::Deposit {
                amount: initial_deposit,
            },
            InitAction::AddStake {
                amount: initial_deposit,
                unstake_delay_secs: ONE_WEEK_SECS,
            },
        ];

        let mut token_paymaster = ContractSpec::new("TokenPaymaster")
            .arg(ArgSlot::address(entry_point))
            .arg(ArgSlot::reference("MakoShard"));
        let mut subscription_paymaster = ContractSpec::new("SubscriptionPaymaster")
            .arg(ArgSlot::address(entry_point))
            .arg(ArgSlot::reference("MakoShard"))
            .arg(ArgSlot::uint(deci_ether(30)));
        for action in paymaster_init {
            token_paymaster = token_paymaster.init(action);
            subscription_paymaster = subscription_paymaster.init(action);
        }

        Self::new(vec![
            ContractSpec::new("MakoEnergy"),
            ContractSpec::new("MakoShard"),
            ContractSpec::new("MakoAccountFactory").arg(ArgSlot::address(entry_point)),
            token_paymaster,
            subscription_paymaster,
        ])
        .stage("DEMO_NFT", ["MakoEnergy"])
        .stage("SmartAccountFactory", ["MakoAccountFactory"])
        .stage("TokenPaymaster", TOKEN_PAYMASTER_STAGE)
        .stage("MakoShard", TOKEN_PAYMASTER_STAGE)
        .stage("SubscriptionPaymaster", SUBSCRIPTION_PAYMASTER_STAGE)
        .stage("MakoEnergy", SUBSCRIPTION_PAYMASTER_STAGE)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::mako(DEFAULT_ENTRY_POINT)
    }
}
