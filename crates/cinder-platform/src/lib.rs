// SPDX-License-Identifier: CEPL-1.0
//! Window and event collaborator. The engine only needs a window that hands out
//! raw handles and an event loop that reports close/resize/occlusion/keys.
pub use winit;

use winit::dpi::PhysicalSize;

/// Logical state the app loop derives from window events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowSignal {
    Quit,
    Minimized,
    Restored,
    Resized { width: u32, height: u32 },
}

/// A zero-area framebuffer is how most platforms report a minimized window.
pub fn signal_for_resize(size: PhysicalSize<u32>) -> WindowSignal {
    if size.width == 0 || size.height == 0 {
        WindowSignal::Minimized
    } else {
        WindowSignal::Resized {
            width: size.width,
            height: size.height,
        }
    }
}

pub fn signal_for_occlusion(occluded: bool) -> WindowSignal {
    if occluded {
        WindowSignal::Minimized
    } else {
        WindowSignal::Restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_resize_means_minimized() {
        assert_eq!(
            signal_for_resize(PhysicalSize::new(0, 600)),
            WindowSignal::Minimized
        );
        assert_eq!(
            signal_for_resize(PhysicalSize::new(800, 0)),
            WindowSignal::Minimized
        );
    }

    #[test]
    fn non_zero_resize_carries_size() {
        assert_eq!(
            signal_for_resize(PhysicalSize::new(800, 600)),
            WindowSignal::Resized {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn occlusion_maps_to_pause_signals() {
        assert_eq!(signal_for_occlusion(true), WindowSignal::Minimized);
        assert_eq!(signal_for_occlusion(false), WindowSignal::Restored);
    }
}
