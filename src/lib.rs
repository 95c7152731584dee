//! Agent Arena - timed battle rounds over a shared agent economy

pub mod agent;
pub mod arena;
pub mod battle;
pub mod core;
pub mod game;
pub mod ledger;
pub mod log;
pub mod registry;

pub use crate::core::config::ArenaConfig;
pub use crate::core::error::{ArenaError, Result};
pub use crate::game::{Continuation, Game};
