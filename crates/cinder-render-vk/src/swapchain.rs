// SPDX-License-Identifier: CEPL-1.0
use ash::khr::{surface, swapchain};
use ash::vk;
use cinder_render::{RenderError, SurfaceExtent};

use crate::image::{image_view_create_info, subresource_range};

pub const SURFACE_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;
pub const SURFACE_COLOR_SPACE: vk::ColorSpaceKHR = vk::ColorSpaceKHR::SRGB_NONLINEAR;

/// The presentable image chain. `images` and `views` are index-aligned and
/// always sized for `extent`.
#[derive(Debug)]
pub struct SurfaceChain {
    pub(crate) swapchain: vk::SwapchainKHR,
    pub(crate) format: vk::Format,
    pub(crate) color_space: vk::ColorSpaceKHR,
    pub(crate) extent: vk::Extent2D,
    pub(crate) images: Vec<vk::Image>,
    pub(crate) views: Vec<vk::ImageView>,
}

impl SurfaceChain {
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn image(&self, index: u32) -> vk::Image {
        self.images[index as usize]
    }
}

pub(crate) fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| f.format == SURFACE_FORMAT && f.color_space == SURFACE_COLOR_SPACE)
        .or_else(|| formats.first().copied())
}

/// Uses the surface's fixed extent when it has one, otherwise clamps the
/// requested size into the supported range.
pub(crate) fn extent_from_caps(
    caps: &vk::SurfaceCapabilitiesKHR,
    want: SurfaceExtent,
) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width()
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height()
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

pub(crate) fn image_count_from_caps(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if caps.max_image_count == 0 {
        caps.min_image_count + 1
    } else {
        (caps.min_image_count + 1).min(caps.max_image_count)
    }
}

/// Builds a FIFO chain of transfer-destination images. The caller must have
/// destroyed any previous chain on this surface.
pub(crate) unsafe fn create_surface_chain(
    device: &ash::Device,
    surface_loader: &surface::Instance,
    swapchain_loader: &swapchain::Device,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    want: SurfaceExtent,
) -> Result<SurfaceChain, RenderError> {
    let caps = surface_loader
        .get_physical_device_surface_capabilities(phys, surface)
        .map_err(|e| RenderError::api("vkGetPhysicalDeviceSurfaceCapabilitiesKHR", e))?;
    let formats = surface_loader
        .get_physical_device_surface_formats(phys, surface)
        .map_err(|e| RenderError::api("vkGetPhysicalDeviceSurfaceFormatsKHR", e))?;

    let surf_format = choose_surface_format(&formats)
        .ok_or_else(|| RenderError::api("vkGetPhysicalDeviceSurfaceFormatsKHR", "no formats"))?;
    let extent = extent_from_caps(&caps, want);
    // A minimized window can report a 0x0 current extent.
    if extent.width == 0 || extent.height == 0 {
        return Err(RenderError::DegenerateExtent {
            width: extent.width,
            height: extent.height,
        });
    }

    let swap_info = vk::SwapchainCreateInfoKHR {
        s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
        surface,
        min_image_count: image_count_from_caps(&caps),
        image_format: surf_format.format,
        image_color_space: surf_format.color_space,
        image_extent: extent,
        image_array_layers: 1,
        image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
        image_sharing_mode: vk::SharingMode::EXCLUSIVE,
        pre_transform: caps.current_transform,
        composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
        present_mode: vk::PresentModeKHR::FIFO,
        clipped: vk::TRUE,
        ..Default::default()
    };

    let swapchain = swapchain_loader
        .create_swapchain(&swap_info, None)
        .map_err(|e| RenderError::api("vkCreateSwapchainKHR", e))?;
    let images = match swapchain_loader.get_swapchain_images(swapchain) {
        Ok(images) => images,
        Err(e) => {
            swapchain_loader.destroy_swapchain(swapchain, None);
            return Err(RenderError::api("vkGetSwapchainImagesKHR", e));
        }
    };

    let mut views = Vec::with_capacity(images.len());
    for &img in &images {
        let iv_info = image_view_create_info(surf_format.format, img, subresource_range(vk::ImageAspectFlags::COLOR));
        match device.create_image_view(&iv_info, None) {
            Ok(view) => views.push(view),
            Err(e) => {
                for &view in &views {
                    device.destroy_image_view(view, None);
                }
                swapchain_loader.destroy_swapchain(swapchain, None);
                return Err(RenderError::api("vkCreateImageView", e));
            }
        }
    }

    Ok(SurfaceChain {
        swapchain,
        format: surf_format.format,
        color_space: surf_format.color_space,
        extent,
        images,
        views,
    })
}

/// Views first, then the swapchain, which owns the images themselves.
pub(crate) unsafe fn destroy_surface_chain(
    device: &ash::Device,
    swapchain_loader: &swapchain::Device,
    chain: SurfaceChain,
) {
    for &view in &chain.views {
        device.destroy_image_view(view, None);
    }
    swapchain_loader.destroy_swapchain(chain.swapchain, None);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_bgra_unorm_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: SURFACE_FORMAT,
                color_space: SURFACE_COLOR_SPACE,
            },
        ];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(SURFACE_FORMAT)
        );
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::R8G8B8A8_SRGB)
        );
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn fixed_surface_extent_wins() {
        let c = caps((800, 600), (1, 1), (4096, 4096));
        let want = SurfaceExtent::new(1700, 900).expect("extent");
        assert_eq!(
            extent_from_caps(&c, want),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn undefined_surface_extent_clamps_request() {
        let c = caps((u32::MAX, u32::MAX), (64, 64), (1024, 768));
        let want = SurfaceExtent::new(1700, 32).expect("extent");
        assert_eq!(
            extent_from_caps(&c, want),
            vk::Extent2D {
                width: 1024,
                height: 64
            }
        );
    }

    #[test]
    fn image_count_is_min_plus_one_capped() {
        let mut c = caps((1, 1), (1, 1), (1, 1));
        assert_eq!(image_count_from_caps(&c), 3);
        c.max_image_count = 2;
        assert_eq!(image_count_from_caps(&c), 2);
        c.max_image_count = 0;
        assert_eq!(image_count_from_caps(&c), 3);
    }
}
