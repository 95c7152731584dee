//! Async driver for the round scheduler
//!
//! One tokio task sleeps until each continuation is due, then runs the step
//! under the game lock. The lock is never held across an await, so user
//! commands interleave with the round on a single timeline. Replacing or
//! stopping the task always bumps the game epoch first; a task that wakes up
//! after that finds its epoch stale and exits without touching state.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::core::error::Result;
use crate::game::{Continuation, Game};

pub type SharedGame = Arc<Mutex<Game>>;

pub struct ArenaRuntime {
    game: SharedGame,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ArenaRuntime {
    pub fn new(game: Game) -> Self {
        Self {
            game: Arc::new(Mutex::new(game)),
            task: Mutex::new(None),
        }
    }

    /// Handle for issuing commands and queries
    pub fn game(&self) -> SharedGame {
        self.game.clone()
    }

    /// Initialize (or reinitialize) the arena and start driving rounds
    ///
    /// Must be called from within a tokio runtime.
    pub fn initialize(&self) {
        let next = self.game.lock().initialize_arena();
        self.spawn(next);
    }

    /// Skip the current wait and start a round immediately
    pub fn start_new_round(&self) -> Result<()> {
        let next = self.game.lock().start_new_round()?;
        self.spawn(next);
        Ok(())
    }

    /// Halt the arena and stop the driver task
    pub fn shutdown(&self) {
        self.game.lock().halt();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().map_or(false, |task| !task.is_finished())
    }

    fn spawn(&self, first: Continuation) {
        let game = self.game.clone();
        let task = tokio::spawn(drive(game, first));
        if let Some(old) = self.task.lock().replace(task) {
            old.abort();
        }
    }
}

impl Drop for ArenaRuntime {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            self.game.lock().halt();
            task.abort();
        }
    }
}

async fn drive(game: SharedGame, mut next: Continuation) {
    loop {
        tokio::time::sleep(next.delay).await;
        let step = game.lock().step(next.epoch);
        match step {
            Some(continuation) => next = continuation,
            None => {
                tracing::debug!("Arena driver for epoch {} stopped", next.epoch);
                break;
            }
        }
    }
}
