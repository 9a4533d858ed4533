// SPDX-License-Identifier: CEPL-1.0
//! Backend-neutral image layouts and the fixed per-frame transition sequences.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    General,
    TransferSrc,
    TransferDst,
    PresentSrc,
    ColorAttachment,
    DepthAttachment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageAspect {
    Color,
    Depth,
}

/// The aspect a barrier must cover is decided by the layout being entered.
pub fn aspect_for_layout(new_layout: ImageLayout) -> ImageAspect {
    match new_layout {
        ImageLayout::DepthAttachment => ImageAspect::Depth,
        _ => ImageAspect::Color,
    }
}

/// Which image a transition in the frame recording applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageTarget {
    Offscreen,
    Presentable(u32),
}

impl fmt::Display for ImageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageTarget::Offscreen => f.write_str("offscreen"),
            ImageTarget::Presentable(i) => write!(f, "presentable[{i}]"),
        }
    }
}

// Every recorded frame walks exactly these chains; the draw target is
// discarded each frame, so it starts from Undefined too.
pub const OFFSCREEN_SEQUENCE: [ImageLayout; 3] = [
    ImageLayout::Undefined,
    ImageLayout::General,
    ImageLayout::TransferSrc,
];
pub const PRESENTABLE_SEQUENCE: [ImageLayout; 3] = [
    ImageLayout::Undefined,
    ImageLayout::TransferDst,
    ImageLayout::PresentSrc,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_layout_selects_depth_aspect() {
        assert_eq!(
            aspect_for_layout(ImageLayout::DepthAttachment),
            ImageAspect::Depth
        );
    }

    #[test]
    fn everything_else_is_color() {
        for layout in [
            ImageLayout::Undefined,
            ImageLayout::General,
            ImageLayout::TransferSrc,
            ImageLayout::TransferDst,
            ImageLayout::PresentSrc,
            ImageLayout::ColorAttachment,
        ] {
            assert_eq!(aspect_for_layout(layout), ImageAspect::Color, "{layout:?}");
        }
    }

    #[test]
    fn sequences_start_undefined() {
        assert_eq!(OFFSCREEN_SEQUENCE[0], ImageLayout::Undefined);
        assert_eq!(PRESENTABLE_SEQUENCE[0], ImageLayout::Undefined);
        assert_eq!(PRESENTABLE_SEQUENCE[2], ImageLayout::PresentSrc);
    }
}
