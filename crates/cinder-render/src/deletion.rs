// SPDX-License-Identifier: CEPL-1.0
//! Deferred teardown.
//!
//! GPU objects outlive the CPU call that used them, so they cannot be released
//! by scope exit. Owners register a teardown action instead, and whoever knows
//! the GPU is done with the resource flushes the queue. Actions run newest
//! first, so anything created on top of an earlier resource (a view on an
//! image, an allocation from an allocator) goes away before what it depends on.

use std::fmt;

type Deletor = Box<dyn FnOnce()>;

#[derive(Default)]
pub struct DeletionQueue {
    deletors: Vec<Deletor>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `action`; the queue now owns the release of whatever it captured.
    pub fn push<F>(&mut self, action: F)
    where
        F: FnOnce() + 'static,
    {
        self.deletors.push(Box::new(action));
    }

    /// Runs every registered action in reverse registration order and empties
    /// the queue. A no-op on an empty queue.
    pub fn flush(&mut self) {
        while let Some(deletor) = self.deletors.pop() {
            deletor();
        }
    }

    pub fn len(&self) -> usize {
        self.deletors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deletors.is_empty()
    }
}

impl fmt::Debug for DeletionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeletionQueue")
            .field("pending", &self.deletors.len())
            .finish()
    }
}

// Pending actions are not run here: releasing GPU objects requires an idle
// device, which only the owner can guarantee.
impl Drop for DeletionQueue {
    fn drop(&mut self) {
        if !self.deletors.is_empty() {
            tracing::warn!(
                "deletion queue dropped with {} pending action(s); resources leaked",
                self.deletors.len()
            );
        }
    }
}
