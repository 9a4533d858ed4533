// SPDX-License-Identifier: CEPL-1.0
//! Vulkan side of the frame protocol. Borrowed fresh for every frame so the
//! scheduler can drive it while the renderer keeps ownership of the parts.
use std::time::Duration;

use ash::khr::swapchain;
use ash::vk;
use cinder_render::{FrameBackend, FrameError, FrameRing, FrameStage, ImageLayout, ImageTarget};
use tracing::warn;

use crate::image::{copy_image_to_image, subresource_range, transition_image, OffscreenTarget};
use crate::swapchain::SurfaceChain;
use crate::sync::FrameSync;

pub(crate) fn timeout_ns(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

pub(crate) struct VkFrameBackend<'a> {
    pub(crate) device: &'a ash::Device,
    pub(crate) swapchain_loader: &'a swapchain::Device,
    pub(crate) queue: vk::Queue,
    pub(crate) chain: &'a SurfaceChain,
    pub(crate) offscreen: OffscreenTarget,
    pub(crate) frames: &'a mut FrameRing<FrameSync>,
}

impl VkFrameBackend<'_> {
    fn sync(&self, slot: usize) -> &FrameSync {
        &self.frames.get(slot).resources
    }

    fn image_for(&self, target: ImageTarget) -> vk::Image {
        match target {
            ImageTarget::Offscreen => self.offscreen.image,
            ImageTarget::Presentable(index) => self.chain.image(index),
        }
    }
}

impl FrameBackend for VkFrameBackend<'_> {
    fn wait_for_slot(&mut self, slot: usize, timeout: Duration) -> Result<(), FrameError> {
        let fence = self.sync(slot).render_fence;
        match unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns(timeout)) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(FrameError::Timeout {
                stage: FrameStage::WaitPrior,
                timeout,
            }),
            Err(e) => Err(FrameError::api(FrameStage::WaitPrior, "vkWaitForFences", e)),
        }
    }

    fn reset_slot_fence(&mut self, slot: usize) -> Result<(), FrameError> {
        let fence = self.sync(slot).render_fence;
        unsafe { self.device.reset_fences(&[fence]) }
            .map_err(|e| FrameError::api(FrameStage::WaitPrior, "vkResetFences", e))
    }

    fn retire_slot(&mut self, slot: usize) {
        self.frames.reset_for_reuse(slot);
    }

    fn rearm_slot_fence(&mut self, slot: usize) -> Result<(), FrameError> {
        // An empty batch still signals its fence once the queue drains.
        let fence = self.sync(slot).render_fence;
        unsafe { self.device.queue_submit(self.queue, &[], fence) }
            .map_err(|e| FrameError::api(FrameStage::Acquire, "vkQueueSubmit", e))
    }

    fn acquire_image(&mut self, slot: usize, timeout: Duration) -> Result<u32, FrameError> {
        let semaphore = self.sync(slot).image_acquired;
        let acquired = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.chain.swapchain,
                timeout_ns(timeout),
                semaphore,
                vk::Fence::null(),
            )
        };
        match acquired {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    warn!("surface chain is suboptimal; continuing until it goes out of date");
                }
                Ok(index)
            }
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Err(FrameError::Timeout {
                stage: FrameStage::Acquire,
                timeout,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                Err(FrameError::SurfaceOutOfDate(FrameStage::Acquire))
            }
            Err(e) => Err(FrameError::api(FrameStage::Acquire, "vkAcquireNextImageKHR", e)),
        }
    }

    fn begin_recording(&mut self, slot: usize) -> Result<(), FrameError> {
        let cmd = self.sync(slot).command_buffer;
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .map_err(|e| FrameError::api(FrameStage::Record, "vkResetCommandBuffer", e))?;
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            self.device
                .begin_command_buffer(cmd, &begin)
                .map_err(|e| FrameError::api(FrameStage::Record, "vkBeginCommandBuffer", e))
        }
    }

    fn transition(
        &mut self,
        slot: usize,
        target: ImageTarget,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    ) {
        let cmd = self.sync(slot).command_buffer;
        let image = self.image_for(target);
        unsafe { transition_image(self.device, cmd, image, old_layout, new_layout) }
    }

    fn clear_offscreen(&mut self, slot: usize, color: [f32; 4]) {
        let cmd = self.sync(slot).command_buffer;
        let clear = vk::ClearColorValue { float32: color };
        let range = subresource_range(vk::ImageAspectFlags::COLOR);
        unsafe {
            self.device.cmd_clear_color_image(
                cmd,
                self.offscreen.image,
                vk::ImageLayout::GENERAL,
                &clear,
                &[range],
            );
        }
    }

    fn blit_to_presentable(&mut self, slot: usize, image_index: u32) {
        let cmd = self.sync(slot).command_buffer;
        unsafe {
            copy_image_to_image(
                self.device,
                cmd,
                self.offscreen.image,
                self.chain.image(image_index),
                self.offscreen.extent_2d(),
                self.chain.extent(),
            );
        }
    }

    fn end_recording(&mut self, slot: usize) -> Result<(), FrameError> {
        let cmd = self.sync(slot).command_buffer;
        unsafe { self.device.end_command_buffer(cmd) }
            .map_err(|e| FrameError::api(FrameStage::Record, "vkEndCommandBuffer", e))
    }

    fn submit(&mut self, slot: usize) -> Result<(), FrameError> {
        let sync = self.sync(slot);

        let cmd_info = vk::CommandBufferSubmitInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_SUBMIT_INFO,
            command_buffer: sync.command_buffer,
            ..Default::default()
        };
        let wait_info = vk::SemaphoreSubmitInfo {
            s_type: vk::StructureType::SEMAPHORE_SUBMIT_INFO,
            semaphore: sync.image_acquired,
            value: 1,
            stage_mask: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            ..Default::default()
        };
        let signal_info = vk::SemaphoreSubmitInfo {
            s_type: vk::StructureType::SEMAPHORE_SUBMIT_INFO,
            semaphore: sync.render_complete,
            value: 1,
            stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
            ..Default::default()
        };
        let submit = vk::SubmitInfo2 {
            s_type: vk::StructureType::SUBMIT_INFO_2,
            wait_semaphore_info_count: 1,
            p_wait_semaphore_infos: &wait_info,
            command_buffer_info_count: 1,
            p_command_buffer_infos: &cmd_info,
            signal_semaphore_info_count: 1,
            p_signal_semaphore_infos: &signal_info,
            ..Default::default()
        };

        unsafe {
            self.device
                .queue_submit2(self.queue, &[submit], sync.render_fence)
        }
        .map_err(|e| FrameError::api(FrameStage::Submit, "vkQueueSubmit2", e))
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<(), FrameError> {
        let wait = [self.sync(slot).render_complete];
        let swapchains = [self.chain.swapchain];
        let indices = [image_index];
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: wait.len() as u32,
            p_wait_semaphores: wait.as_ptr(),
            swapchain_count: 1,
            p_swapchains: swapchains.as_ptr(),
            p_image_indices: indices.as_ptr(),
            ..Default::default()
        };

        match unsafe { self.swapchain_loader.queue_present(self.queue, &present) } {
            Ok(suboptimal) => {
                if suboptimal {
                    warn!("present reported a suboptimal surface chain");
                }
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                Err(FrameError::SurfaceOutOfDate(FrameStage::Present))
            }
            Err(e) => Err(FrameError::api(FrameStage::Present, "vkQueuePresentKHR", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_second_in_nanoseconds() {
        assert_eq!(timeout_ns(Duration::from_secs(1)), 1_000_000_000);
    }

    #[test]
    fn huge_timeouts_saturate() {
        assert_eq!(timeout_ns(Duration::MAX), u64::MAX);
    }
}
