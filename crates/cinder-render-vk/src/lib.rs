// SPDX-License-Identifier: CEPL-1.0
//! Vulkan 1.3 renderer: clears an offscreen target every frame and blits it
//! to the window through a double-buffered frame ring.
use anyhow::{Context, Result};
use tracing::{info, warn};

use cinder_render::{
    FrameError, FrameReport, FrameRing, FrameScheduler, RenderError, RenderSettings, RenderSize,
    Renderer,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

mod backend;
mod context;
mod descriptors;
mod device;
mod image;
mod swapchain;
mod sync;

pub use context::RenderContext;
pub use descriptors::DescriptorLayoutBuilder;
pub use image::{copy_image_to_image, transition_image, OffscreenTarget, OFFSCREEN_FORMAT};
pub use swapchain::SurfaceChain;

use backend::VkFrameBackend;
use sync::FrameSync;

pub struct VkRenderer {
    // Option so Drop can hand them back to the context in a fixed order.
    chain: Option<SurfaceChain>,
    frames: Option<FrameRing<FrameSync>>,
    offscreen: OffscreenTarget,
    scheduler: FrameScheduler,
    size: RenderSize,
    context: RenderContext,
}

impl VkRenderer {
    pub fn frame_number(&self) -> u64 {
        self.scheduler.counter().value()
    }

    /// Replaces the surface chain after the surface went out of date or the
    /// window changed size. The offscreen target keeps its size; the blit
    /// scales it onto the new chain. If the surface currently has no area the
    /// chain stays empty and frames are skipped until the next resize.
    fn rebuild_surface_chain(&mut self, size: RenderSize) -> Result<(), RenderError> {
        self.context.wait_idle()?;

        if let Some(old) = self.chain.take() {
            self.context.destroy_surface_chain(old);
        }
        if let Some(frames) = self.frames.as_mut() {
            let device = self.context.device();
            for slot in frames.slots_mut() {
                unsafe { slot.resources.renew_semaphores(device)? };
            }
        }

        self.size = size;
        match self.context.create_surface_chain(size) {
            Ok(chain) => {
                self.chain = Some(chain);
                Ok(())
            }
            Err(RenderError::DegenerateExtent { width, height }) => {
                info!("surface is {width}x{height}; waiting for a resize before drawing");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: RenderSettings,
    ) -> Result<Self> {
        let mut context = RenderContext::initialize(window, display, &settings)
            .context("vulkan context initialization")?;

        // From here on `context` cleans up through its own Drop, but the
        // pieces below must go back to it first.
        let chain = context
            .create_surface_chain(size)
            .context("initial surface chain")?;
        let offscreen = match context.create_offscreen_target(size) {
            Ok(t) => t,
            Err(e) => {
                context.destroy_surface_chain(chain);
                return Err(e).context("offscreen target");
            }
        };

        let queue_family = context.queue_family();
        let device = context.device();
        let frames = FrameRing::try_new(
            |_| unsafe { FrameSync::create(device, queue_family) },
            |built| unsafe { built.destroy(device) },
        );
        let frames = match frames {
            Ok(f) => f,
            Err(e) => {
                context.destroy_surface_chain(chain);
                return Err(e).context("frame slots");
            }
        };

        let scheduler = FrameScheduler::new(settings.frame_timeout);
        info!(
            "renderer ready: {}x{} offscreen, frame timeout {:?}",
            offscreen.extent.width,
            offscreen.extent.height,
            scheduler.timeout()
        );

        Ok(Self {
            chain: Some(chain),
            frames: Some(frames),
            offscreen,
            scheduler,
            size,
            context,
        })
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        if size.is_degenerate() {
            return Ok(());
        }
        if size == self.size && self.chain.is_some() {
            return Ok(());
        }
        info!("resize -> {}x{}", size.width, size.height);
        self.rebuild_surface_chain(size)
            .context("rebuilding surface chain")
    }

    fn render(&mut self) -> Result<Option<FrameReport>, FrameError> {
        let (Some(chain), Some(frames)) = (self.chain.as_ref(), self.frames.as_mut()) else {
            return Ok(None);
        };

        let mut backend = VkFrameBackend {
            device: self.context.device(),
            swapchain_loader: self.context.swapchain_loader(),
            queue: self.context.queue(),
            chain,
            offscreen: self.offscreen,
            frames,
        };

        match self.scheduler.draw_frame(&mut backend) {
            Ok(report) => Ok(Some(report)),
            Err(err) if !err.is_fatal() => {
                warn!("{err}; rebuilding surface chain");
                let stage = err.stage();
                self.rebuild_surface_chain(self.size)
                    .map_err(|e| FrameError::api(stage, "surface chain rebuild", e))?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            warn!("wait idle before teardown: {e}");
        }
        if let Some(frames) = self.frames.take() {
            let device = self.context.device();
            for sync in frames.drain() {
                unsafe { sync.destroy(device) };
            }
        }
        self.context.flush_deletions();
        if let Some(chain) = self.chain.take() {
            self.context.destroy_surface_chain(chain);
        }
        self.context.shutdown();
    }
}
