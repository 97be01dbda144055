//! Scripted command channel for tests
//!
//! `MockChannel` records every command written to it and answers reads from a
//! queue of canned replies. It provides:
//! - A call log for verifying exact command sequences
//! - A FIFO of replies returned by `read`
//! - One-shot failure injection, optionally delayed by a number of writes
//!
//! Clones share state, so a test can keep one handle and move another into the
//! driver.

use super::CommandChannel;
use crate::error::{AppResult, SmuError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MockState {
    writes: Vec<String>,
    replies: VecDeque<String>,
    fail_after_writes: Option<usize>,
}

/// Scripted channel with a shared call log.
///
/// # Example
///
/// ```
/// use smu_daq::adapters::{CommandChannel, MockChannel};
///
/// let mock = MockChannel::new();
/// mock.push_reply("KEITHLEY INSTRUMENTS INC.,MODEL 2401,4321,C30");
///
/// let mut channel = mock.clone();
/// let idn = channel.query("*IDN?").unwrap();
/// assert!(idn.contains("2401"));
/// assert_eq!(mock.writes(), vec!["*IDN?".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct MockChannel {
    resource: String,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChannel {
    /// Create an empty mock with no queued replies.
    pub fn new() -> Self {
        Self {
            resource: "MOCK0::INSTR".to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Use a specific resource name in metadata.
    pub fn with_resource_name(mut self, resource: &str) -> Self {
        self.resource = resource.to_string();
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a reply for the next `read`.
    pub fn push_reply(&self, reply: &str) {
        self.lock().replies.push_back(reply.to_string());
    }

    /// Fail the next write.
    pub fn inject_next_failure(&self) {
        self.inject_failure_after(0);
    }

    /// Let `writes` more writes succeed, then fail the one after.
    pub fn inject_failure_after(&self, writes: usize) {
        self.lock().fail_after_writes = Some(writes);
    }

    /// Every command written so far, in order.
    pub fn writes(&self) -> Vec<String> {
        self.lock().writes.clone()
    }

    /// Number of commands written so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    /// Forget the call log.
    pub fn clear_log(&self) {
        self.lock().writes.clear();
    }

    /// Replies still waiting to be read.
    pub fn pending_replies(&self) -> usize {
        self.lock().replies.len()
    }
}

impl CommandChannel for MockChannel {
    fn write(&mut self, command: &str) -> AppResult<()> {
        let mut state = self.lock();
        match state.fail_after_writes {
            Some(0) => {
                state.fail_after_writes = None;
                return Err(SmuError::Channel(format!(
                    "injected failure writing '{command}'"
                )));
            }
            Some(remaining) => state.fail_after_writes = Some(remaining - 1),
            None => {}
        }
        state.writes.push(command.to_string());
        Ok(())
    }

    fn read(&mut self) -> AppResult<String> {
        self.lock()
            .replies
            .pop_front()
            .ok_or_else(|| SmuError::Channel("no reply queued on mock channel".to_string()))
    }

    fn resource_name(&self) -> String {
        self.resource.clone()
    }
}
