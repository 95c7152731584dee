pub mod config;
pub mod error;
pub mod types;

pub use config::{ArenaConfig, EconomyConfig, TimingConfig};
pub use error::{ArenaError, Result};
pub use types::{AgentId, Amount, Owner, ProviderKind, RoundNumber, Timestamp};
