//! Battle log streams with bounded retention

use std::collections::VecDeque;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::core::types::{RoundNumber, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Attack,
    Kill,
    Damage,
    RoundStart,
    RoundEnd,
    Join,
    Leave,
    /// Scheduler notices such as a round with no eligible agents
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub kind: LogKind,
    pub message: String,
    pub damage: Option<u32>,
    pub is_highlight: bool,
    pub timestamp: Timestamp,
    pub round: Option<RoundNumber>,
}

/// Which stream an entry is appended to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogStream {
    /// Everything happening in the arena
    Arena,
    /// Entries touching the connected user's agents
    User,
}

/// Builder for a log entry before it is stamped by the sink
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub kind: LogKind,
    pub message: String,
    pub damage: Option<u32>,
    pub is_highlight: bool,
    pub round: Option<RoundNumber>,
}

impl NewEntry {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            damage: None,
            is_highlight: false,
            round: None,
        }
    }

    pub fn highlight(mut self) -> Self {
        self.is_highlight = true;
        self
    }

    pub fn damage(mut self, damage: u32) -> Self {
        self.damage = Some(damage);
        self
    }

    pub fn round(mut self, round: RoundNumber) -> Self {
        self.round = Some(round);
        self
    }
}

#[derive(Debug)]
pub struct LogSink {
    arena: VecDeque<LogEntry>,
    user: VecDeque<LogEntry>,
    retention: usize,
    next_id: u64,
}

impl LogSink {
    pub fn new(retention: usize) -> Self {
        Self {
            arena: VecDeque::new(),
            user: VecDeque::new(),
            retention: retention.max(1),
            next_id: 1,
        }
    }

    /// Stamp and append an entry, dropping the oldest beyond retention
    pub fn append(&mut self, stream: LogStream, entry: NewEntry) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let entry = LogEntry {
            id,
            kind: entry.kind,
            message: entry.message,
            damage: entry.damage,
            is_highlight: entry.is_highlight,
            timestamp: Utc::now(),
            round: entry.round,
        };

        let target = match stream {
            LogStream::Arena => &mut self.arena,
            LogStream::User => &mut self.user,
        };
        target.push_back(entry);
        while target.len() > self.retention {
            target.pop_front();
        }
        id
    }

    /// Entries of one stream, newest first
    pub fn entries(&self, stream: LogStream) -> impl Iterator<Item = &LogEntry> + '_ {
        match stream {
            LogStream::Arena => self.arena.iter().rev(),
            LogStream::User => self.user.iter().rev(),
        }
    }

    pub fn len(&self, stream: LogStream) -> usize {
        match stream {
            LogStream::Arena => self.arena.len(),
            LogStream::User => self.user.len(),
        }
    }
}
