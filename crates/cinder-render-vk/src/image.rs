// SPDX-License-Identifier: CEPL-1.0
//! Layout transitions, image-to-image copies and the offscreen draw target.
use ash::vk;
use cinder_render::{aspect_for_layout, ImageAspect, ImageLayout};

/// Format of the offscreen target: wide enough for HDR work later on.
pub const OFFSCREEN_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

pub fn to_vk_layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthAttachment => vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
    }
}

pub fn to_vk_aspect(aspect: ImageAspect) -> vk::ImageAspectFlags {
    match aspect {
        ImageAspect::Color => vk::ImageAspectFlags::COLOR,
        ImageAspect::Depth => vk::ImageAspectFlags::DEPTH,
    }
}

/// Every mip level and array layer of the image.
pub fn subresource_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: vk::REMAINING_ARRAY_LAYERS,
    }
}

pub(crate) fn layout_barrier(
    image: vk::Image,
    old_layout: ImageLayout,
    new_layout: ImageLayout,
) -> vk::ImageMemoryBarrier2<'static> {
    vk::ImageMemoryBarrier2 {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
        src_stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
        src_access_mask: vk::AccessFlags2::MEMORY_WRITE,
        dst_stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
        dst_access_mask: vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ,
        old_layout: to_vk_layout(old_layout),
        new_layout: to_vk_layout(new_layout),
        image,
        subresource_range: subresource_range(to_vk_aspect(aspect_for_layout(new_layout))),
        ..Default::default()
    }
}

/// Records one full-image barrier moving `image` from `old_layout` to
/// `new_layout`. `old_layout` must be the layout the image is actually in;
/// nothing here checks it.
pub unsafe fn transition_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: ImageLayout,
    new_layout: ImageLayout,
) {
    let barrier = layout_barrier(image, old_layout, new_layout);
    let dep = vk::DependencyInfo {
        s_type: vk::StructureType::DEPENDENCY_INFO,
        image_memory_barrier_count: 1,
        p_image_memory_barriers: &barrier,
        ..Default::default()
    };
    device.cmd_pipeline_barrier2(cmd, &dep);
}

fn far_corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    }
}

pub(crate) fn blit_region(src_size: vk::Extent2D, dst_size: vk::Extent2D) -> vk::ImageBlit2<'static> {
    let layer = vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };
    vk::ImageBlit2 {
        s_type: vk::StructureType::IMAGE_BLIT_2,
        src_subresource: layer,
        src_offsets: [vk::Offset3D::default(), far_corner(src_size)],
        dst_subresource: layer,
        dst_offsets: [vk::Offset3D::default(), far_corner(dst_size)],
        ..Default::default()
    }
}

/// Blits all of `src` onto all of `dst`, scaling linearly when the sizes
/// differ. `src` must be in TRANSFER_SRC_OPTIMAL and `dst` in
/// TRANSFER_DST_OPTIMAL.
pub unsafe fn copy_image_to_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src: vk::Image,
    dst: vk::Image,
    src_size: vk::Extent2D,
    dst_size: vk::Extent2D,
) {
    let region = blit_region(src_size, dst_size);
    let blit_info = vk::BlitImageInfo2 {
        s_type: vk::StructureType::BLIT_IMAGE_INFO_2,
        src_image: src,
        src_image_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        dst_image: dst,
        dst_image_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        region_count: 1,
        p_regions: &region,
        filter: vk::Filter::LINEAR,
        ..Default::default()
    };
    device.cmd_blit_image2(cmd, &blit_info);
}

pub fn image_create_info(
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    extent: vk::Extent3D,
) -> vk::ImageCreateInfo<'static> {
    vk::ImageCreateInfo {
        s_type: vk::StructureType::IMAGE_CREATE_INFO,
        image_type: vk::ImageType::TYPE_2D,
        format,
        extent,
        mip_levels: 1,
        array_layers: 1,
        samples: vk::SampleCountFlags::TYPE_1,
        tiling: vk::ImageTiling::OPTIMAL,
        usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        ..Default::default()
    }
}

pub fn image_view_create_info(
    format: vk::Format,
    image: vk::Image,
    subresource_range: vk::ImageSubresourceRange,
) -> vk::ImageViewCreateInfo<'static> {
    vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        subresource_range: vk::ImageSubresourceRange {
            level_count: 1,
            layer_count: 1,
            ..subresource_range
        },
        ..Default::default()
    }
}

/// Handles of the image every frame renders into before it is blitted to the
/// presentable image. Destruction is owned by the context's deletion queue.
#[derive(Clone, Copy, Debug)]
pub struct OffscreenTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
}

impl OffscreenTarget {
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    pub(crate) fn usage() -> vk::ImageUsageFlags {
        vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::TRANSFER_DST
            | vk::ImageUsageFlags::STORAGE
            | vk::ImageUsageFlags::COLOR_ATTACHMENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_map_one_to_one() {
        assert_eq!(to_vk_layout(ImageLayout::Undefined), vk::ImageLayout::UNDEFINED);
        assert_eq!(to_vk_layout(ImageLayout::General), vk::ImageLayout::GENERAL);
        assert_eq!(
            to_vk_layout(ImageLayout::TransferSrc),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL
        );
        assert_eq!(
            to_vk_layout(ImageLayout::TransferDst),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        );
        assert_eq!(
            to_vk_layout(ImageLayout::PresentSrc),
            vk::ImageLayout::PRESENT_SRC_KHR
        );
    }

    #[test]
    fn barrier_covers_whole_image_with_color_aspect() {
        let b = layout_barrier(
            vk::Image::null(),
            ImageLayout::Undefined,
            ImageLayout::General,
        );
        assert_eq!(b.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(b.new_layout, vk::ImageLayout::GENERAL);
        assert_eq!(b.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(b.subresource_range.level_count, vk::REMAINING_MIP_LEVELS);
        assert_eq!(b.subresource_range.layer_count, vk::REMAINING_ARRAY_LAYERS);
        assert_eq!(b.src_stage_mask, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert!(b.dst_access_mask.contains(vk::AccessFlags2::MEMORY_READ));
    }

    #[test]
    fn depth_barrier_uses_depth_aspect() {
        let b = layout_barrier(
            vk::Image::null(),
            ImageLayout::Undefined,
            ImageLayout::DepthAttachment,
        );
        assert_eq!(b.subresource_range.aspect_mask, vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn blit_region_spans_both_extents() {
        let r = blit_region(
            vk::Extent2D {
                width: 1700,
                height: 900,
            },
            vk::Extent2D {
                width: 800,
                height: 600,
            },
        );
        assert_eq!((r.src_offsets[1].x, r.src_offsets[1].y, r.src_offsets[1].z), (1700, 900, 1));
        assert_eq!((r.dst_offsets[1].x, r.dst_offsets[1].y, r.dst_offsets[1].z), (800, 600, 1));
        assert_eq!(r.src_offsets[0].x, 0);
    }

    #[test]
    fn offscreen_usage_allows_copy_out() {
        let usage = OffscreenTarget::usage();
        assert!(usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert!(usage.contains(vk::ImageUsageFlags::STORAGE));
    }
}
