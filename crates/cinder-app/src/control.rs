// SPDX-License-Identifier: CEPL-1.0
//! Per-iteration decisions of the app loop, kept apart from winit so they can
//! be driven directly.
use std::time::{Duration, Instant};

use cinder_platform::WindowSignal;
use cinder_render::{FrameError, FrameReport};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Nothing was drawn; sleep until `wake_at`.
    Paused { wake_at: Instant },
    /// The renderer ran. `None` means it skipped the frame.
    Drew(Option<FrameReport>),
    Quit,
}

#[derive(Debug)]
pub struct LoopControl {
    paused: bool,
    quit: bool,
    paused_sleep: Duration,
}

impl LoopControl {
    pub fn new(paused_sleep: Duration) -> Self {
        Self {
            paused: false,
            quit: false,
            paused_sleep,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn apply(&mut self, signal: WindowSignal) {
        match signal {
            WindowSignal::Quit => self.quit = true,
            WindowSignal::Minimized => self.set_paused(true),
            WindowSignal::Restored | WindowSignal::Resized { .. } => self.set_paused(false),
        }
    }

    fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            self.paused = paused;
            info!("paused={}", paused);
        }
    }

    /// One loop iteration. While paused `render` is not called at all.
    pub fn tick<F>(&mut self, now: Instant, render: F) -> Result<Tick, FrameError>
    where
        F: FnOnce() -> Result<Option<FrameReport>, FrameError>,
    {
        if self.quit {
            return Ok(Tick::Quit);
        }
        if self.paused {
            return Ok(Tick::Paused {
                wake_at: now + self.paused_sleep,
            });
        }
        render().map(Tick::Drew)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_render::FrameStage;

    fn report(frame: u64) -> FrameReport {
        FrameReport {
            frame,
            slot: (frame % 2) as usize,
            image_index: 0,
        }
    }

    #[test]
    fn paused_iteration_only_sleeps() {
        let mut ctl = LoopControl::new(Duration::from_millis(100));
        ctl.apply(WindowSignal::Minimized);

        let now = Instant::now();
        let mut called = false;
        let tick = ctl
            .tick(now, || {
                called = true;
                Ok(Some(report(0)))
            })
            .expect("tick");

        assert!(!called);
        assert_eq!(
            tick,
            Tick::Paused {
                wake_at: now + Duration::from_millis(100)
            }
        );
    }

    #[test]
    fn restore_resumes_drawing() {
        let mut ctl = LoopControl::new(Duration::from_millis(100));
        ctl.apply(WindowSignal::Minimized);
        ctl.apply(WindowSignal::Restored);
        assert!(!ctl.is_paused());

        let tick = ctl.tick(Instant::now(), || Ok(Some(report(7)))).expect("tick");
        assert_eq!(tick, Tick::Drew(Some(report(7))));
    }

    #[test]
    fn non_zero_resize_unpauses() {
        let mut ctl = LoopControl::new(Duration::from_millis(100));
        ctl.apply(WindowSignal::Minimized);
        ctl.apply(WindowSignal::Resized {
            width: 640,
            height: 480,
        });
        assert!(!ctl.is_paused());
    }

    #[test]
    fn quit_wins_over_pause() {
        let mut ctl = LoopControl::new(Duration::from_millis(100));
        ctl.apply(WindowSignal::Minimized);
        ctl.apply(WindowSignal::Quit);
        assert!(ctl.should_quit());
        let tick = ctl
            .tick(Instant::now(), || panic!("must not render after quit"))
            .expect("tick");
        assert_eq!(tick, Tick::Quit);
    }

    #[test]
    fn render_errors_pass_through() {
        let mut ctl = LoopControl::new(Duration::from_millis(100));
        let err = ctl
            .tick(Instant::now(), || {
                Err(FrameError::Timeout {
                    stage: FrameStage::WaitPrior,
                    timeout: Duration::from_secs(1),
                })
            })
            .expect_err("timeout propagates");
        assert!(err.is_fatal());
    }
}
