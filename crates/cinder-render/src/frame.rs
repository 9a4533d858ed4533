// SPDX-License-Identifier: CEPL-1.0
//! Rotating per-frame storage.
//!
//! Each slot carries the backend's recording and sync objects plus a private
//! [`DeletionQueue`] for resources whose last use was the slot's most recent
//! submission. The queue is flushed only once the scheduler has seen the slot's
//! fence signal, right before the slot is recorded into again.

use crate::deletion::DeletionQueue;

/// Number of frames that may be in flight at once (double buffering).
pub const FRAME_OVERLAP: usize = 2;

/// Monotonic frame number. Only the scheduler advances it, after a present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameCounter(u64);

impl FrameCounter {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn slot(self) -> usize {
        (self.0 % FRAME_OVERLAP as u64) as usize
    }

    pub(crate) fn advance(&mut self) {
        self.0 += 1;
    }
}

#[derive(Debug)]
pub struct FrameSlot<T> {
    pub resources: T,
    deletion: DeletionQueue,
}

impl<T> FrameSlot<T> {
    pub fn new(resources: T) -> Self {
        Self {
            resources,
            deletion: DeletionQueue::new(),
        }
    }

    /// Defers `action` until this slot's current submission has retired.
    pub fn defer<F>(&mut self, action: F)
    where
        F: FnOnce() + 'static,
    {
        self.deletion.push(action);
    }

    pub fn pending_deletions(&self) -> usize {
        self.deletion.len()
    }
}

#[derive(Debug)]
pub struct FrameRing<T> {
    slots: [FrameSlot<T>; FRAME_OVERLAP],
}

impl<T> FrameRing<T> {
    pub fn new(slots: [T; FRAME_OVERLAP]) -> Self {
        Self {
            slots: slots.map(FrameSlot::new),
        }
    }

    /// Builds every slot with `make`, stopping at the first error. Slots that
    /// were already built are handed to `discard` before the error returns.
    pub fn try_new<E>(
        mut make: impl FnMut(usize) -> Result<T, E>,
        mut discard: impl FnMut(T),
    ) -> Result<Self, E> {
        // The array literal below stops compiling if FRAME_OVERLAP changes.
        let first = make(0)?;
        let second = match make(1) {
            Ok(t) => t,
            Err(e) => {
                discard(first);
                return Err(e);
            }
        };
        Ok(Self::new([first, second]))
    }

    pub fn current(&self, counter: FrameCounter) -> &FrameSlot<T> {
        &self.slots[counter.slot()]
    }

    pub fn current_mut(&mut self, counter: FrameCounter) -> &mut FrameSlot<T> {
        &mut self.slots[counter.slot()]
    }

    pub fn get(&self, index: usize) -> &FrameSlot<T> {
        &self.slots[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut FrameSlot<T> {
        &mut self.slots[index]
    }

    /// Releases what the slot's previous use left behind. The caller must
    /// already have observed the slot's fence signaled.
    pub fn reset_for_reuse(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        if !slot.deletion.is_empty() {
            tracing::debug!(slot = index, count = slot.deletion.len(), "retiring deferred deletions");
        }
        slot.deletion.flush();
    }

    pub fn slots_mut(&mut self) -> impl Iterator<Item = &mut FrameSlot<T>> {
        self.slots.iter_mut()
    }

    /// Flushes every slot's queue and hands back the payloads for teardown.
    /// Only valid once the device is idle.
    pub fn drain(mut self) -> [T; FRAME_OVERLAP] {
        for slot in self.slots.iter_mut() {
            slot.deletion.flush();
        }
        self.slots.map(|s| s.resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn slot_index_is_counter_mod_overlap() {
        let mut c = FrameCounter::new();
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push((c.value(), c.slot()));
            c.advance();
        }
        assert_eq!(seen, vec![(0, 0), (1, 1), (2, 0), (3, 1), (4, 0)]);
    }

    #[test]
    fn current_follows_counter() {
        let mut ring = FrameRing::new(["first", "second"]);
        let mut c = FrameCounter::new();
        assert_eq!(ring.current(c).resources, "first");
        c.advance();
        assert_eq!(ring.current_mut(c).resources, "second");
        c.advance();
        assert_eq!(ring.current(c).resources, "first");
    }

    #[test]
    fn reset_for_reuse_only_touches_that_slot() {
        let freed = Rc::new(Cell::new(0));
        let mut ring = FrameRing::new([(), ()]);
        for i in 0..FRAME_OVERLAP {
            let freed = freed.clone();
            ring.get_mut(i).defer(move || freed.set(freed.get() + 1));
        }

        ring.reset_for_reuse(0);
        assert_eq!(freed.get(), 1);
        assert_eq!(ring.get(0).pending_deletions(), 0);
        assert_eq!(ring.get(1).pending_deletions(), 1);

        ring.reset_for_reuse(1);
        assert_eq!(freed.get(), 2);
    }

    #[test]
    fn try_new_propagates_first_error() {
        let mut made = Vec::new();
        let r: Result<FrameRing<u32>, &str> = FrameRing::try_new(
            |i| {
                made.push(i);
                Err("pool")
            },
            |_| panic!("nothing was built"),
        );
        assert_eq!(r.err(), Some("pool"));
        assert_eq!(made, vec![0], "later slots are not attempted");
    }

    #[test]
    fn try_new_hands_back_built_slots_on_failure() {
        let mut discarded = Vec::new();
        let r: Result<FrameRing<&str>, &str> = FrameRing::try_new(
            |i| if i == 1 { Err("fence") } else { Ok("slot0") },
            |t| discarded.push(t),
        );
        assert_eq!(r.err(), Some("fence"));
        assert_eq!(discarded, vec!["slot0"]);
    }

    #[test]
    fn try_new_success_discards_nothing() {
        let mut discarded = 0;
        let ring = FrameRing::try_new(|i| Ok::<_, ()>(i * 10), |_| discarded += 1)
            .expect("ring");
        assert_eq!(discarded, 0);
        assert_eq!(ring.get(1).resources, 10);
    }

    #[test]
    fn drain_flushes_pending_work() {
        let freed = Rc::new(Cell::new(false));
        let mut ring = FrameRing::new([1u8, 2u8]);
        let f = freed.clone();
        ring.get_mut(1).defer(move || f.set(true));
        let payloads = ring.drain();
        assert!(freed.get());
        assert_eq!(payloads, [1, 2]);
    }
}
