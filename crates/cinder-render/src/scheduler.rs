// SPDX-License-Identifier: CEPL-1.0
//! The per-frame protocol.
//!
//! ```text
//! WaitPrior -> Acquire -> Record -> Submit -> Present -> Advance
//! ```
//!
//! * WaitPrior: block on the slot fence (bounded), reset it, retire the slot's
//!   deferred deletions.
//! * Acquire: next presentable image; the slot's image-acquired semaphore is
//!   raised by the presentation engine.
//! * Record: offscreen Undefined -> General, background clear, offscreen
//!   -> TransferSrc, presentable Undefined -> TransferDst, blit, presentable
//!   -> PresentSrc.
//! * Submit: wait image-acquired at color output, signal render-complete and
//!   the slot fence.
//! * Present: wait render-complete.
//! * Advance: bump the frame counter.
//!
//! GPU lookahead is bounded by [`FRAME_OVERLAP`](crate::FRAME_OVERLAP): a slot
//! cannot be recorded again until the fence from its previous use signals.

use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::background::background_color;
use crate::error::FrameError;
use crate::frame::FrameCounter;
use crate::layout::{ImageLayout, ImageTarget, OFFSCREEN_SEQUENCE, PRESENTABLE_SEQUENCE};

pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStage {
    WaitPrior,
    Acquire,
    Record,
    Submit,
    Present,
    Advance,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FrameStage::WaitPrior => "wait-prior",
            FrameStage::Acquire => "acquire",
            FrameStage::Record => "record",
            FrameStage::Submit => "submit",
            FrameStage::Present => "present",
            FrameStage::Advance => "advance",
        })
    }
}

/// GPU-side operations the scheduler sequences. Slot indices are always
/// `counter mod FRAME_OVERLAP`.
pub trait FrameBackend {
    /// Blocks until the slot's fence signals or `timeout` passes.
    fn wait_for_slot(&mut self, slot: usize, timeout: Duration) -> Result<(), FrameError>;
    fn reset_slot_fence(&mut self, slot: usize) -> Result<(), FrameError>;
    /// Flushes the slot's deferred deletions.
    fn retire_slot(&mut self, slot: usize);
    /// Puts the slot fence back into the signaled state without recording,
    /// used when a frame is abandoned after its fence was reset.
    fn rearm_slot_fence(&mut self, slot: usize) -> Result<(), FrameError>;

    fn acquire_image(&mut self, slot: usize, timeout: Duration) -> Result<u32, FrameError>;

    fn begin_recording(&mut self, slot: usize) -> Result<(), FrameError>;
    fn transition(
        &mut self,
        slot: usize,
        target: ImageTarget,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    );
    fn clear_offscreen(&mut self, slot: usize, color: [f32; 4]);
    fn blit_to_presentable(&mut self, slot: usize, image_index: u32);
    fn end_recording(&mut self, slot: usize) -> Result<(), FrameError>;

    fn submit(&mut self, slot: usize) -> Result<(), FrameError>;
    fn present(&mut self, slot: usize, image_index: u32) -> Result<(), FrameError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    pub slot: usize,
    pub image_index: u32,
}

#[derive(Debug)]
pub struct FrameScheduler {
    counter: FrameCounter,
    timeout: Duration,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_TIMEOUT)
    }
}

impl FrameScheduler {
    pub fn new(timeout: Duration) -> Self {
        Self {
            counter: FrameCounter::new(),
            timeout,
        }
    }

    pub fn counter(&self) -> FrameCounter {
        self.counter
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs one full frame. On error the counter is left untouched; the
    /// caller decides whether the error is fatal.
    pub fn draw_frame<B>(&mut self, backend: &mut B) -> Result<FrameReport, FrameError>
    where
        B: FrameBackend + ?Sized,
    {
        let frame = self.counter.value();
        let slot = self.counter.slot();
        let _span = tracing::debug_span!("frame", frame, slot).entered();

        backend.wait_for_slot(slot, self.timeout)?;
        backend.reset_slot_fence(slot)?;
        backend.retire_slot(slot);

        let image_index = match backend.acquire_image(slot, self.timeout) {
            Ok(index) => index,
            Err(err) => {
                // Nothing will be submitted this frame, so the fence we just
                // reset would never signal again.
                if !err.is_fatal() {
                    backend.rearm_slot_fence(slot)?;
                }
                return Err(err);
            }
        };
        debug!(image_index, "acquired");

        self.record(backend, slot, image_index, frame)?;
        backend.submit(slot)?;
        backend.present(slot, image_index)?;

        self.counter.advance();
        Ok(FrameReport {
            frame,
            slot,
            image_index,
        })
    }

    fn record<B>(
        &self,
        backend: &mut B,
        slot: usize,
        image_index: u32,
        frame: u64,
    ) -> Result<(), FrameError>
    where
        B: FrameBackend + ?Sized,
    {
        let [off_undefined, off_general, off_src] = OFFSCREEN_SEQUENCE;
        let [pres_undefined, pres_dst, pres_present] = PRESENTABLE_SEQUENCE;
        let presentable = ImageTarget::Presentable(image_index);

        backend.begin_recording(slot)?;

        backend.transition(slot, ImageTarget::Offscreen, off_undefined, off_general);
        backend.clear_offscreen(slot, background_color(frame));

        backend.transition(slot, ImageTarget::Offscreen, off_general, off_src);
        backend.transition(slot, presentable, pres_undefined, pres_dst);
        backend.blit_to_presentable(slot, image_index);
        backend.transition(slot, presentable, pres_dst, pres_present);

        backend.end_recording(slot)
    }
}
