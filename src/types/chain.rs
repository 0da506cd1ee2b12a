use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Chains a proof can target. Solana-family networks come first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Blockchain {
    Solana,
    SolanaDevnet,
    Eclipse,
    Ethereum,
    Polygon,
    Base,
    Arbitrum,
    Optimism,
    Avalanche,
}

impl Blockchain {
    pub const ALL: [Blockchain; 9] = [
        Blockchain::Solana,
        Blockchain::SolanaDevnet,
        Blockchain::Eclipse,
        Blockchain::Ethereum,
        Blockchain::Polygon,
        Blockchain::Base,
        Blockchain::Arbitrum,
        Blockchain::Optimism,
        Blockchain::Avalanche,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Blockchain::Solana => "solana",
            Blockchain::SolanaDevnet => "solana-devnet",
            Blockchain::Eclipse => "eclipse",
            Blockchain::Ethereum => "ethereum",
            Blockchain::Polygon => "polygon",
            Blockchain::Base => "base",
            Blockchain::Arbitrum => "arbitrum",
            Blockchain::Optimism => "optimism",
            Blockchain::Avalanche => "avalanche",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Blockchain::Solana => "Solana",
            Blockchain::SolanaDevnet => "Solana Devnet",
            Blockchain::Eclipse => "Eclipse",
            Blockchain::Ethereum => "Ethereum",
            Blockchain::Polygon => "Polygon",
            Blockchain::Base => "Base",
            Blockchain::Arbitrum => "Arbitrum",
            Blockchain::Optimism => "Optimism",
            Blockchain::Avalanche => "Avalanche",
        }
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Blockchain {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Blockchain::ALL
            .into_iter()
            .find(|chain| chain.as_str() == value)
            .ok_or_else(|| format!("unsupported chain `{value}`"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainHealth {
    Online,
    Degraded,
    Offline,
}

/// Per-instance view of a chain's health as shown on the dashboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStatus {
    pub chain: Blockchain,
    pub status: ChainHealth,
    pub verification_count: u64,
    pub avg_latency: u64,
    pub last_block: u64,
}
