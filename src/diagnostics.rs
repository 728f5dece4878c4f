// src/diagnostics.rs

//! Accumulated errors and warnings for a planning session
//!
//! Non-fatal problems (duplicate package definitions, ambiguous choices,
//! resolver notes) are collected here instead of aborting the operation.
//! Messages are kept in FIFO order. A pending flag records whether any
//! error was queued.
//!
//! Speculative work saves the current accumulator with [`Diagnostics::push_state`]
//! and later either merges it back ([`Diagnostics::pop_state`]) or throws the
//! speculative messages away ([`Diagnostics::discard`] followed by `pop_state`).
//! [`Diagnostics::attempt`] wraps that pattern for a closure.

use std::collections::VecDeque;
use std::fmt;
use tracing::{error, warn};

/// Severity of a queued message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A single queued message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub severity: Severity,
    pub text: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "E: {}", self.text),
            Severity::Warning => write!(f, "W: {}", self.text),
        }
    }
}

/// One saved accumulator
#[derive(Debug, Default, Clone)]
struct State {
    list: VecDeque<Message>,
    pending: bool,
}

/// Error and warning accumulator with a stack of saved states
#[derive(Debug, Default)]
pub struct Diagnostics {
    current: State,
    stack: Vec<State>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error. Always returns `false` so callers can `return diag.error(..)`.
    pub fn error(&mut self, text: impl Into<String>) -> bool {
        self.current.list.push_back(Message {
            severity: Severity::Error,
            text: text.into(),
        });
        self.current.pending = true;
        false
    }

    /// Queue a warning
    pub fn warning(&mut self, text: impl Into<String>) {
        self.current.list.push_back(Message {
            severity: Severity::Warning,
            text: text.into(),
        });
    }

    /// True if an error was queued since the last discard
    pub fn pending_error(&self) -> bool {
        self.current.pending
    }

    pub fn is_empty(&self) -> bool {
        self.current.list.is_empty()
    }

    pub fn len(&self) -> usize {
        self.current.list.len()
    }

    /// Iterate over queued messages without consuming them
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.current.list.iter()
    }

    /// Pop the oldest message. The pending flag clears once the list is empty.
    pub fn pop_message(&mut self) -> Option<Message> {
        let msg = self.current.list.pop_front();
        if self.current.list.is_empty() {
            self.current.pending = false;
        }
        msg
    }

    /// Drop every queued message in the current state
    pub fn discard(&mut self) {
        self.current.list.clear();
        self.current.pending = false;
    }

    /// Emit all queued messages through tracing and empty the list
    pub fn dump(&mut self) {
        while let Some(msg) = self.pop_message() {
            match msg.severity {
                Severity::Error => error!("{}", msg.text),
                Severity::Warning => warn!("{}", msg.text),
            }
        }
    }

    /// Save the current accumulator and start an empty one
    pub fn push_state(&mut self) {
        let saved = std::mem::take(&mut self.current);
        self.stack.push(saved);
    }

    /// Restore the most recently saved accumulator.
    ///
    /// Messages queued since the matching `push_state` are appended after the
    /// saved ones and the pending flags are combined. Returns `false` when no
    /// state was saved.
    pub fn pop_state(&mut self) -> bool {
        match self.stack.pop() {
            Some(saved) => {
                self.merge_into_current(saved);
                true
            }
            None => false,
        }
    }

    /// Like [`pop_state`](Self::pop_state) but restores the oldest saved state.
    ///
    /// The states saved above it stay on the stack.
    pub fn pop_back_state(&mut self) -> bool {
        if self.stack.is_empty() {
            return false;
        }
        let bottom = self.stack.remove(0);
        self.merge_into_current(bottom);
        true
    }

    /// Depth of the saved-state stack
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Run `f` in a fresh accumulator.
    ///
    /// On `Err` the messages it queued are discarded before the previous state
    /// is restored, so a failed speculative attempt leaves no trace. On `Ok`
    /// its messages are kept.
    pub fn attempt<T, E>(
        &mut self,
        f: impl FnOnce(&mut Self) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        self.push_state();
        let result = f(self);
        if result.is_err() {
            self.discard();
        }
        self.pop_state();
        result
    }

    fn merge_into_current(&mut self, mut saved: State) {
        let newer = std::mem::take(&mut self.current);
        saved.list.extend(newer.list);
        saved.pending |= newer.pending;
        self.current = saved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order_and_pending_flag() {
        let mut diag = Diagnostics::new();
        diag.warning("first");
        assert!(!diag.pending_error());
        assert!(!diag.error("second"));
        assert!(diag.pending_error());

        let msg = diag.pop_message().unwrap();
        assert_eq!(msg.text, "first");
        assert_eq!(msg.severity, Severity::Warning);
        assert!(diag.pending_error());

        let msg = diag.pop_message().unwrap();
        assert_eq!(msg.severity, Severity::Error);
        assert!(!diag.pending_error());
        assert!(diag.pop_message().is_none());
    }

    #[test]
    fn test_push_pop_state_merges_in_order() {
        let mut diag = Diagnostics::new();
        diag.warning("outer");
        diag.push_state();
        assert!(diag.is_empty());
        assert!(!diag.pending_error());
        diag.error("inner");
        assert!(diag.pop_state());

        let texts: Vec<_> = diag.messages().map(|m| m.text.clone()).collect();
        assert_eq!(texts, vec!["outer", "inner"]);
        assert!(diag.pending_error());
        assert!(!diag.pop_state());
    }

    #[test]
    fn test_discard_before_pop_drops_speculative_messages() {
        let mut diag = Diagnostics::new();
        diag.error("kept");
        diag.push_state();
        diag.warning("speculative");
        diag.discard();
        diag.pop_state();

        assert_eq!(diag.len(), 1);
        assert!(diag.pending_error());
    }

    #[test]
    fn test_pop_back_state_restores_oldest() {
        let mut diag = Diagnostics::new();
        diag.warning("a");
        diag.push_state();
        diag.warning("b");
        diag.push_state();
        diag.warning("c");

        assert!(diag.pop_back_state());
        assert_eq!(diag.depth(), 1);
        let texts: Vec<_> = diag.messages().map(|m| m.text.clone()).collect();
        assert_eq!(texts, vec!["a", "c"]);
    }

    #[test]
    fn test_attempt_discards_on_failure() {
        let mut diag = Diagnostics::new();
        let result: Result<(), ()> = diag.attempt(|d| {
            d.error("will vanish");
            Err(())
        });
        assert!(result.is_err());
        assert!(diag.is_empty());
        assert_eq!(diag.depth(), 0);

        let result: Result<u32, ()> = diag.attempt(|d| {
            d.warning("kept");
            Ok(7)
        });
        assert_eq!(result, Ok(7));
        assert_eq!(diag.len(), 1);
    }
}
