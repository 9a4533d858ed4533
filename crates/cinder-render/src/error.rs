// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use thiserror::Error;

use crate::scheduler::FrameStage;

/// Startup and resource-building failures. None of these are retryable.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("a render context is already alive in this process")]
    ContextAlreadyExists,
    #[error("no physical device supports Vulkan 1.3 with dynamic rendering, synchronization2, descriptor indexing and buffer device address")]
    NoSuitableDevice,
    #[error("degenerate surface extent {width}x{height}")]
    DegenerateExtent { width: u32, height: u32 },
    #[error("{call} failed: {result}")]
    Api { call: &'static str, result: String },
    #[error("gpu allocation failed: {0}")]
    Allocation(String),
    #[error("window handle unavailable: {0}")]
    Window(String),
}

impl RenderError {
    pub fn api(call: &'static str, result: impl std::fmt::Debug) -> Self {
        RenderError::Api {
            call,
            result: format!("{result:?}"),
        }
    }
}

/// Failures inside the per-frame protocol.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("{stage} did not complete within {timeout:?}")]
    Timeout { stage: FrameStage, timeout: Duration },
    #[error("surface out of date during {0}")]
    SurfaceOutOfDate(FrameStage),
    #[error("{call} failed during {stage}: {result}")]
    Api {
        stage: FrameStage,
        call: &'static str,
        result: String,
    },
}

impl FrameError {
    pub fn api(stage: FrameStage, call: &'static str, result: impl std::fmt::Debug) -> Self {
        FrameError::Api {
            stage,
            call,
            result: format!("{result:?}"),
        }
    }

    /// Everything except an out-of-date surface ends the process.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FrameError::SurfaceOutOfDate(_))
    }

    pub fn stage(&self) -> FrameStage {
        match self {
            FrameError::Timeout { stage, .. } | FrameError::Api { stage, .. } => *stage,
            FrameError::SurfaceOutOfDate(stage) => *stage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_out_of_date_is_recoverable() {
        assert!(!FrameError::SurfaceOutOfDate(FrameStage::Present).is_fatal());
        assert!(FrameError::Timeout {
            stage: FrameStage::WaitPrior,
            timeout: Duration::from_secs(1)
        }
        .is_fatal());
        assert!(FrameError::api(FrameStage::Submit, "vkQueueSubmit2", "ERROR_DEVICE_LOST").is_fatal());
    }

    #[test]
    fn messages_name_the_stage_and_call() {
        let e = FrameError::api(FrameStage::Present, "vkQueuePresentKHR", "ERROR_SURFACE_LOST_KHR");
        let msg = e.to_string();
        assert!(msg.contains("vkQueuePresentKHR"), "{msg}");
        assert!(msg.contains("present"), "{msg}");
        assert_eq!(e.stage(), FrameStage::Present);
    }

    #[test]
    fn degenerate_extent_reports_size() {
        let e = RenderError::DegenerateExtent {
            width: 0,
            height: 900,
        };
        assert_eq!(e.to_string(), "degenerate surface extent 0x900");
    }
}
