// SPDX-License-Identifier: CEPL-1.0
//! Backend-independent frame lifecycle: deferred deletion, slot rotation,
//! layout sequencing and the draw-loop state machine.
use std::time::Duration;

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

mod background;
mod deletion;
mod error;
mod frame;
mod layout;
mod scheduler;

pub use background::{background_color, BACKGROUND_PERIOD_FRAMES};
pub use deletion::DeletionQueue;
pub use error::{FrameError, RenderError};
pub use frame::{FrameCounter, FrameRing, FrameSlot, FRAME_OVERLAP};
pub use layout::{
    aspect_for_layout, ImageAspect, ImageLayout, ImageTarget, OFFSCREEN_SEQUENCE,
    PRESENTABLE_SEQUENCE,
};
pub use scheduler::{
    FrameBackend, FrameReport, FrameScheduler, FrameStage, DEFAULT_FRAME_TIMEOUT,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_degenerate(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A surface size that is known to be non-zero in both dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceExtent {
    width: u32,
    height: u32,
}

impl SurfaceExtent {
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }

    pub fn width(self) -> u32 {
        self.width
    }

    pub fn height(self) -> u32 {
        self.height
    }
}

impl TryFrom<RenderSize> for SurfaceExtent {
    type Error = RenderError;

    fn try_from(size: RenderSize) -> Result<Self, Self::Error> {
        SurfaceExtent::new(size.width, size.height).ok_or(RenderError::DegenerateExtent {
            width: size.width,
            height: size.height,
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RenderSettings {
    /// Bound on the fence wait and on image acquisition.
    pub frame_timeout: Duration,
    pub validation: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            validation: cfg!(debug_assertions),
        }
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: RenderSettings,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Rebuilds the presentable chain for `size`. Degenerate sizes are ignored.
    fn resize(&mut self, size: RenderSize) -> Result<()>;

    /// Draws one frame. `Ok(None)` means the frame was skipped after a
    /// recoverable surface condition; any `Err` is fatal.
    fn render(&mut self) -> std::result::Result<Option<FrameReport>, FrameError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(SurfaceExtent::new(0, 900).is_none());
        assert!(SurfaceExtent::new(1700, 0).is_none());
        assert!(SurfaceExtent::new(0, 0).is_none());
    }

    #[test]
    fn render_size_converts_when_non_zero() {
        let ext = SurfaceExtent::try_from(RenderSize {
            width: 1700,
            height: 900,
        })
        .expect("valid extent");
        assert_eq!((ext.width(), ext.height()), (1700, 900));
    }

    #[test]
    fn degenerate_render_size_reports_error() {
        let size = RenderSize {
            width: 0,
            height: 10,
        };
        assert!(size.is_degenerate());
        let err = SurfaceExtent::try_from(size).expect_err("degenerate");
        assert!(matches!(
            err,
            RenderError::DegenerateExtent {
                width: 0,
                height: 10
            }
        ));
    }

    #[test]
    fn default_settings_use_one_second_timeout() {
        assert_eq!(RenderSettings::default().frame_timeout, Duration::from_secs(1));
    }
}
