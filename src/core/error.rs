use thiserror::Error;

use crate::agent::AgentStatus;
use crate::core::types::{AgentId, Amount};

#[derive(Error, Debug)]
pub enum ArenaError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient wallet balance: requested {requested}, available {available}")]
    InsufficientWalletBalance { requested: Amount, available: Amount },

    #[error("Insufficient agent balance: requested {requested}, available {available}")]
    InsufficientAgentBalance { requested: Amount, available: Amount },

    #[error("Agent {id} is busy ({status:?})")]
    AgentBusy { id: AgentId, status: AgentStatus },

    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("Arena has not been initialized")]
    ArenaNotReady,

    #[error("A round is already in progress")]
    RoundInProgress,

    #[error("Wallet is not connected")]
    WalletNotConnected,

    #[error("Agent {0} is not owned by the connected wallet")]
    NotOwner(AgentId),

    #[error("Leverage {0}x is not allowed")]
    InvalidLeverage(u32),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ArenaError>;
