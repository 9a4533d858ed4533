// SPDX-License-Identifier: CEPL-1.0
//! The process-wide Vulkan context.
//!
//! Owns everything that lives for the whole session: instance, debug
//! messenger, window surface, device, graphics queue, the GPU allocator and
//! the global deletion queue. Only one may be alive at a time; the
//! constructor refuses a second one.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use cinder_render::{DeletionQueue, RenderError, RenderSettings, RenderSize, SurfaceExtent};
use gpu_allocator::vulkan::{
    AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};

use crate::device::{self, DebugMessenger};
use crate::image::{
    image_create_info, image_view_create_info, subresource_range, OffscreenTarget,
    OFFSCREEN_FORMAT,
};
use crate::swapchain::{self as chain, SurfaceChain};

/// The allocator is taken out (and dropped) by the last entry of the global
/// deletion queue, before the device goes away.
pub(crate) type SharedAllocator = Arc<Mutex<Option<Allocator>>>;

static CONTEXT_ALIVE: AtomicBool = AtomicBool::new(false);

/// Held by a live [`RenderContext`]; releasing it allows the next one.
#[derive(Debug)]
pub(crate) struct ContextGuard(());

impl ContextGuard {
    pub(crate) fn acquire() -> Result<Self, RenderError> {
        CONTEXT_ALIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ContextGuard(()))
            .map_err(|_| RenderError::ContextAlreadyExists)
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CONTEXT_ALIVE.store(false, Ordering::Release);
    }
}

pub struct RenderContext {
    _entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,

    phys: vk::PhysicalDevice,
    device: ash::Device,
    queue_family: u32,
    queue: vk::Queue,
    swapchain_loader: swapchain::Device,

    allocator: SharedAllocator,
    deletion: DeletionQueue,
    destroyed: bool,
    // Last field: released only after everything above is gone.
    _guard: ContextGuard,
}

impl RenderContext {
    /// Brings up instance, surface, device, queue and allocator for `window`.
    /// Failure here is unrecoverable.
    pub fn initialize(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        settings: &RenderSettings,
    ) -> Result<Self, RenderError> {
        let guard = ContextGuard::acquire()?;

        let dh = display
            .display_handle()
            .map_err(|e| RenderError::Window(e.to_string()))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| RenderError::Window(e.to_string()))?
            .as_raw();

        unsafe {
            // STRICT ORDER: instance -> surface -> device selection against
            // this surface -> device -> allocator.
            let entry = Entry::linked();
            let (instance, validation) = device::create_instance(&entry, dh, settings.validation)?;

            let debug = if validation {
                match device::create_debug_messenger(&entry, &instance) {
                    Ok(d) => Some(d),
                    Err(e) => {
                        warn!("validation requested but messenger failed: {e}");
                        None
                    }
                }
            } else {
                None
            };

            let surface_loader = surface::Instance::new(&entry, &instance);
            let surface = match ash_window::create_surface(&entry, &instance, dh, wh, None) {
                Ok(s) => s,
                Err(e) => {
                    if let Some(d) = debug {
                        d.destroy();
                    }
                    instance.destroy_instance(None);
                    return Err(RenderError::api("ash_window::create_surface", e));
                }
            };

            let built = device::select_device(&instance, &surface_loader, surface).and_then(|chosen| {
                let (device, queue) = device::create_device(&instance, &chosen)?;
                let allocator = Allocator::new(&AllocatorCreateDesc {
                    instance: instance.clone(),
                    device: device.clone(),
                    physical_device: chosen.phys,
                    debug_settings: Default::default(),
                    buffer_device_address: true,
                    allocation_sizes: Default::default(),
                });
                match allocator {
                    Ok(a) => Ok((chosen, device, queue, a)),
                    Err(e) => {
                        device.destroy_device(None);
                        Err(RenderError::Allocation(e.to_string()))
                    }
                }
            });
            let (chosen, device, queue, allocator) = match built {
                Ok(parts) => parts,
                Err(e) => {
                    surface_loader.destroy_surface(surface, None);
                    if let Some(d) = debug {
                        d.destroy();
                    }
                    instance.destroy_instance(None);
                    return Err(e);
                }
            };

            let swapchain_loader = swapchain::Device::new(&instance, &device);
            let allocator: SharedAllocator = Arc::new(Mutex::new(Some(allocator)));

            let mut deletion = DeletionQueue::new();
            let alloc = allocator.clone();
            deletion.push(move || {
                let mut slot = match alloc.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                drop(slot.take());
                debug!("gpu allocator destroyed");
            });

            info!(
                "vulkan context ready (validation={}, queue family {})",
                validation, chosen.queue_family
            );

            Ok(RenderContext {
                _entry: entry,
                instance,
                debug,
                surface_loader,
                surface,
                phys: chosen.phys,
                device,
                queue_family: chosen.queue_family,
                queue,
                swapchain_loader,
                allocator,
                deletion,
                destroyed: false,
                _guard: guard,
            })
        }
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    pub(crate) fn swapchain_loader(&self) -> &swapchain::Device {
        &self.swapchain_loader
    }

    pub fn wait_idle(&self) -> Result<(), RenderError> {
        unsafe { self.device.device_wait_idle() }
            .map_err(|e| RenderError::api("vkDeviceWaitIdle", e))
    }

    /// Builds a new presentable chain. Zero-sized requests are rejected
    /// before any API call. Any previous chain must already be destroyed.
    pub fn create_surface_chain(&self, size: RenderSize) -> Result<SurfaceChain, RenderError> {
        let want = SurfaceExtent::try_from(size)?;
        let built = unsafe {
            chain::create_surface_chain(
                &self.device,
                &self.surface_loader,
                &self.swapchain_loader,
                self.phys,
                self.surface,
                want,
            )?
        };
        info!(
            "surface chain ready ({}x{}, {} images, fmt {:?}/{:?})",
            built.extent.width,
            built.extent.height,
            built.image_count(),
            built.format(),
            built.color_space
        );
        Ok(built)
    }

    /// Releases the chain's views and swapchain. The images belong to the
    /// swapchain and go with it.
    pub fn destroy_surface_chain(&self, chain: SurfaceChain) {
        unsafe { chain::destroy_surface_chain(&self.device, &self.swapchain_loader, chain) }
    }

    /// Allocates the offscreen draw target in device-local memory. Its
    /// destruction is queued on the global deletion queue.
    pub fn create_offscreen_target(&mut self, size: RenderSize) -> Result<OffscreenTarget, RenderError> {
        let want = SurfaceExtent::try_from(size)?;
        let extent = vk::Extent3D {
            width: want.width(),
            height: want.height(),
            depth: 1,
        };

        unsafe {
            let img_info = image_create_info(OFFSCREEN_FORMAT, OffscreenTarget::usage(), extent);
            let image = self
                .device
                .create_image(&img_info, None)
                .map_err(|e| RenderError::api("vkCreateImage", e))?;
            let requirements = self.device.get_image_memory_requirements(image);

            let allocation = {
                let mut guard = match self.allocator.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let Some(allocator) = guard.as_mut() else {
                    self.device.destroy_image(image, None);
                    return Err(RenderError::Allocation("allocator already destroyed".into()));
                };
                allocator
                    .allocate(&AllocationCreateDesc {
                        name: "offscreen target",
                        requirements,
                        location: MemoryLocation::GpuOnly,
                        linear: false,
                        allocation_scheme: AllocationScheme::DedicatedImage(image),
                    })
                    .map_err(|e| RenderError::Allocation(e.to_string()))
            };
            let allocation = match allocation {
                Ok(a) => a,
                Err(e) => {
                    self.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            let bound = self
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(|e| RenderError::api("vkBindImageMemory", e))
                .and_then(|()| {
                    let view_info = image_view_create_info(
                        OFFSCREEN_FORMAT,
                        image,
                        subresource_range(vk::ImageAspectFlags::COLOR),
                    );
                    self.device
                        .create_image_view(&view_info, None)
                        .map_err(|e| RenderError::api("vkCreateImageView", e))
                });

            let device = self.device.clone();
            let alloc = self.allocator.clone();
            let view = bound.as_ref().ok().copied();
            // Registered even on failure so the image and memory are released
            // through the same path.
            self.deletion.push(move || {
                if let Some(view) = view {
                    device.destroy_image_view(view, None);
                }
                device.destroy_image(image, None);
                let mut slot = match alloc.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if let Some(allocator) = slot.as_mut() {
                    if let Err(e) = allocator.free(allocation) {
                        warn!("freeing offscreen target memory failed: {e}");
                    }
                }
            });
            let view = bound?;

            info!(
                "offscreen target ready ({}x{}, {:?})",
                extent.width, extent.height, OFFSCREEN_FORMAT
            );
            Ok(OffscreenTarget {
                image,
                view,
                format: OFFSCREEN_FORMAT,
                extent,
            })
        }
    }

    /// Runs the global deletion queue. The device must be idle.
    pub fn flush_deletions(&mut self) {
        self.deletion.flush();
    }

    /// Waits for the GPU, flushes the global deletion queue (allocator last)
    /// and destroys surface, device, debug messenger and instance in that
    /// order. Per-frame state and the surface chain must be gone already.
    /// Idempotent.
    pub fn shutdown(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                warn!("device_wait_idle at shutdown: {e:?}");
            }
            self.deletion.flush();

            self.surface_loader.destroy_surface(self.surface, None);
            self.device.destroy_device(None);
            if let Some(d) = self.debug.take() {
                d.destroy();
            }
            self.instance.destroy_instance(None);
        }
        info!("vulkan context destroyed");
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_context_guard_at_a_time() {
        let first = ContextGuard::acquire().expect("first guard");
        assert!(matches!(
            ContextGuard::acquire(),
            Err(RenderError::ContextAlreadyExists)
        ));
        drop(first);
        let again = ContextGuard::acquire().expect("guard released on drop");
        drop(again);
    }
}
