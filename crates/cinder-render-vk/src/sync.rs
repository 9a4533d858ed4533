// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use cinder_render::RenderError;

/// Recording context and sync objects for one frame slot.
#[derive(Debug)]
pub struct FrameSync {
    pub(crate) command_pool: vk::CommandPool,
    pub(crate) command_buffer: vk::CommandBuffer,
    /// Raised by the presentation engine once the acquired image is usable.
    pub(crate) image_acquired: vk::Semaphore,
    /// Raised when the slot's submission finishes; presentation waits on it.
    pub(crate) render_complete: vk::Semaphore,
    /// Signaled with the slot's submission. Created signaled so the first wait
    /// returns immediately.
    pub(crate) render_fence: vk::Fence,
}

impl FrameSync {
    pub(crate) unsafe fn create(device: &ash::Device, queue_family: u32) -> Result<Self, RenderError> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: queue_family,
            ..Default::default()
        };
        let command_pool = device
            .create_command_pool(&pool_info, None)
            .map_err(|e| RenderError::api("vkCreateCommandPool", e))?;

        // From here on every early return must release what was created so far.
        let mut sync = FrameSync {
            command_pool,
            command_buffer: vk::CommandBuffer::null(),
            image_acquired: vk::Semaphore::null(),
            render_complete: vk::Semaphore::null(),
            render_fence: vk::Fence::null(),
        };
        if let Err(e) = sync.create_members(device) {
            sync.destroy(device);
            return Err(e);
        }
        Ok(sync)
    }

    unsafe fn create_members(&mut self, device: &ash::Device) -> Result<(), RenderError> {
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        self.command_buffer = device
            .allocate_command_buffers(&alloc_info)
            .map_err(|e| RenderError::api("vkAllocateCommandBuffers", e))?[0];

        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        self.render_fence = device
            .create_fence(&fence_ci, None)
            .map_err(|e| RenderError::api("vkCreateFence", e))?;
        self.renew_semaphores(device)
    }

    /// Replaces both semaphores. Only valid while the device is idle; used
    /// after a surface rebuild, when an abandoned present may have left one
    /// signaled.
    pub(crate) unsafe fn renew_semaphores(&mut self, device: &ash::Device) -> Result<(), RenderError> {
        self.destroy_semaphores(device);
        let sem_ci = vk::SemaphoreCreateInfo::default();
        self.image_acquired = device
            .create_semaphore(&sem_ci, None)
            .map_err(|e| RenderError::api("vkCreateSemaphore", e))?;
        self.render_complete = device
            .create_semaphore(&sem_ci, None)
            .map_err(|e| RenderError::api("vkCreateSemaphore", e))?;
        Ok(())
    }

    unsafe fn destroy_semaphores(&mut self, device: &ash::Device) {
        if self.image_acquired != vk::Semaphore::null() {
            device.destroy_semaphore(self.image_acquired, None);
            self.image_acquired = vk::Semaphore::null();
        }
        if self.render_complete != vk::Semaphore::null() {
            device.destroy_semaphore(self.render_complete, None);
            self.render_complete = vk::Semaphore::null();
        }
    }

    /// Destroying the pool frees its command buffer.
    pub(crate) unsafe fn destroy(mut self, device: &ash::Device) {
        device.destroy_command_pool(self.command_pool, None);
        if self.render_fence != vk::Fence::null() {
            device.destroy_fence(self.render_fence, None);
        }
        self.destroy_semaphores(device);
    }
}
