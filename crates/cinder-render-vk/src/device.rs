// SPDX-License-Identifier: CEPL-1.0
// Instance, debug messenger and physical/logical device bring-up.
use std::ffi::{c_char, CStr, CString};

use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use cinder_render::RenderError;
use raw_window_handle::RawDisplayHandle;
use tracing::{debug, error, info, trace, warn};

const APP_NAME: &str = "Cinder";
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub(crate) struct DebugMessenger {
    loader: debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub(crate) unsafe fn destroy(self) {
        self.loader.destroy_debug_utils_messenger(self.handle, None);
    }
}

/// Physical device that passed every requirement, plus its graphics queue family.
#[derive(Clone, Debug)]
pub(crate) struct DeviceCandidate {
    pub phys: vk::PhysicalDevice,
    pub queue_family: u32,
    pub name: String,
    pub kind: vk::PhysicalDeviceType,
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", ?types, "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", ?types, "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!(target: "vulkan", ?types, "{msg}");
    } else {
        trace!(target: "vulkan", ?types, "{msg}");
    }
    vk::FALSE
}

unsafe fn has_validation_layer(entry: &Entry) -> bool {
    entry
        .enumerate_instance_layer_properties()
        .unwrap_or_default()
        .iter()
        .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == VALIDATION_LAYER)
}

/// Creates a Vulkan 1.3 instance with the window-system extensions. When
/// `validation` is set and the layer is installed, the Khronos validation
/// layer and debug utils are enabled as well; the returned flag says whether
/// that happened.
pub(crate) unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    validation: bool,
) -> Result<(Instance, bool), RenderError> {
    let app = CString::new(APP_NAME).map_err(|e| RenderError::api("CString::new", e))?;

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: 0,
        p_engine_name: app.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_3,
        ..Default::default()
    };

    let wsi = ash_window::enumerate_required_extensions(display_raw)
        .map_err(|e| RenderError::api("enumerate_required_extensions", e))?;
    let mut ext_vec: Vec<*const c_char> = wsi.to_vec();

    let validation = validation && has_validation_layer(entry);
    if validation {
        ext_vec.push(debug_utils::NAME.as_ptr());
    }
    let layers = [VALIDATION_LAYER.as_ptr()];
    let (enabled_layer_count, pp_enabled_layer_names) = if validation {
        (layers.len() as u32, layers.as_ptr())
    } else {
        (0u32, std::ptr::null())
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: ext_vec.len() as u32,
        pp_enabled_extension_names: ext_vec.as_ptr(),
        enabled_layer_count,
        pp_enabled_layer_names,
        ..Default::default()
    };

    let instance = entry
        .create_instance(&create_info, None)
        .map_err(|e| RenderError::api("vkCreateInstance", e))?;
    Ok((instance, validation))
}

pub(crate) unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
) -> Result<DebugMessenger, RenderError> {
    let loader = debug_utils::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let handle = loader
        .create_debug_utils_messenger(&ci, None)
        .map_err(|e| RenderError::api("vkCreateDebugUtilsMessengerEXT", e))?;
    Ok(DebugMessenger { loader, handle })
}

pub(crate) fn meets_api_version(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    major > 1 || (major == 1 && minor >= 3)
}

/// Dynamic rendering + synchronization2 (1.3) and bindless-capable descriptor
/// indexing with buffer device address (1.2).
pub(crate) fn has_required_features(
    feats12: &vk::PhysicalDeviceVulkan12Features<'_>,
    feats13: &vk::PhysicalDeviceVulkan13Features<'_>,
) -> bool {
    feats13.dynamic_rendering == vk::TRUE
        && feats13.synchronization2 == vk::TRUE
        && feats12.buffer_device_address == vk::TRUE
        && feats12.descriptor_indexing == vk::TRUE
}

/// Higher wins. Discrete before integrated before anything else.
pub(crate) fn device_type_rank(kind: vk::PhysicalDeviceType) -> u32 {
    match kind {
        vk::PhysicalDeviceType::DISCRETE_GPU => 3,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
        _ => 0,
    }
}

unsafe fn query_features(instance: &Instance, phys: vk::PhysicalDevice) -> bool {
    let mut feats12 = vk::PhysicalDeviceVulkan12Features {
        s_type: vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_2_FEATURES,
        ..Default::default()
    };
    let mut feats13 = vk::PhysicalDeviceVulkan13Features {
        s_type: vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_3_FEATURES,
        ..Default::default()
    };
    feats12.p_next = (&mut feats13) as *mut _ as *mut _;
    let mut feats2 = vk::PhysicalDeviceFeatures2 {
        s_type: vk::StructureType::PHYSICAL_DEVICE_FEATURES_2,
        p_next: (&mut feats12) as *mut _ as *mut _,
        ..Default::default()
    };
    instance.get_physical_device_features2(phys, &mut feats2);
    has_required_features(&feats12, &feats13)
}

unsafe fn has_swapchain_extension(instance: &Instance, phys: vk::PhysicalDevice) -> bool {
    instance
        .enumerate_device_extension_properties(phys)
        .unwrap_or_default()
        .iter()
        .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == swapchain::NAME)
}

unsafe fn graphics_present_family(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
) -> Option<u32> {
    let qprops = instance.get_physical_device_queue_family_properties(phys);
    qprops.iter().enumerate().find_map(|(i, q)| {
        let i = i as u32;
        let present = surface_loader
            .get_physical_device_surface_support(phys, i, surface)
            .unwrap_or(false);
        (q.queue_flags.contains(vk::QueueFlags::GRAPHICS) && present).then_some(i)
    })
}

/// Picks the best device that meets every requirement. No candidate is an
/// unrecoverable startup error.
pub(crate) unsafe fn select_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<DeviceCandidate, RenderError> {
    let devices = instance
        .enumerate_physical_devices()
        .map_err(|e| RenderError::api("vkEnumeratePhysicalDevices", e))?;

    let mut best: Option<DeviceCandidate> = None;
    for phys in devices {
        let props = instance.get_physical_device_properties(phys);
        let name = props
            .device_name_as_c_str()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !meets_api_version(props.api_version) {
            debug!("skipping {name}: Vulkan {}.{} < 1.3",
                vk::api_version_major(props.api_version),
                vk::api_version_minor(props.api_version));
            continue;
        }
        if !query_features(instance, phys) {
            debug!("skipping {name}: missing required 1.2/1.3 features");
            continue;
        }
        if !has_swapchain_extension(instance, phys) {
            debug!("skipping {name}: no VK_KHR_swapchain");
            continue;
        }
        let Some(queue_family) = graphics_present_family(instance, surface_loader, surface, phys)
        else {
            debug!("skipping {name}: no graphics queue that can present to the surface");
            continue;
        };

        let candidate = DeviceCandidate {
            phys,
            queue_family,
            name,
            kind: props.device_type,
        };
        let better = best
            .as_ref()
            .map_or(true, |b| device_type_rank(candidate.kind) > device_type_rank(b.kind));
        if better {
            best = Some(candidate);
        }
    }

    let chosen = best.ok_or(RenderError::NoSuitableDevice)?;
    info!("device: {} ({:?}), queue family {}", chosen.name, chosen.kind, chosen.queue_family);
    Ok(chosen)
}

/// Creates the logical device with one graphics queue and the required
/// feature chain enabled.
pub(crate) unsafe fn create_device(
    instance: &Instance,
    chosen: &DeviceCandidate,
) -> Result<(ash::Device, vk::Queue), RenderError> {
    let priorities = [1.0_f32];
    let qinfo = vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: chosen.queue_family,
        queue_count: 1,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
    };

    // feats13 -> chained after feats12 -> chained after feats2
    let mut feats13 = vk::PhysicalDeviceVulkan13Features {
        s_type: vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_3_FEATURES,
        dynamic_rendering: vk::TRUE,
        synchronization2: vk::TRUE,
        ..Default::default()
    };
    let mut feats12 = vk::PhysicalDeviceVulkan12Features {
        s_type: vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_2_FEATURES,
        buffer_device_address: vk::TRUE,
        descriptor_indexing: vk::TRUE,
        ..Default::default()
    };
    feats12.p_next = (&mut feats13) as *mut _ as *mut _;
    let mut feats2 = vk::PhysicalDeviceFeatures2 {
        s_type: vk::StructureType::PHYSICAL_DEVICE_FEATURES_2,
        p_next: (&mut feats12) as *mut _ as *mut _,
        ..Default::default()
    };

    let device_exts = [swapchain::NAME.as_ptr()];
    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        p_next: (&mut feats2) as *mut _ as *const _,
        queue_create_info_count: 1,
        p_queue_create_infos: &qinfo,
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        ..Default::default()
    };

    let device = instance
        .create_device(chosen.phys, &dinfo, None)
        .map_err(|e| RenderError::api("vkCreateDevice", e))?;
    let queue = device.get_device_queue(chosen.queue_family, 0);
    Ok((device, queue))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_version_gate_is_1_3() {
        assert!(meets_api_version(vk::API_VERSION_1_3));
        assert!(meets_api_version(vk::make_api_version(0, 1, 4, 0)));
        assert!(!meets_api_version(vk::API_VERSION_1_2));
        assert!(!meets_api_version(vk::API_VERSION_1_0));
    }

    #[test]
    fn every_required_feature_must_be_present() {
        let full12 = vk::PhysicalDeviceVulkan12Features {
            buffer_device_address: vk::TRUE,
            descriptor_indexing: vk::TRUE,
            ..Default::default()
        };
        let full13 = vk::PhysicalDeviceVulkan13Features {
            dynamic_rendering: vk::TRUE,
            synchronization2: vk::TRUE,
            ..Default::default()
        };
        assert!(has_required_features(&full12, &full13));

        let no_sync2 = vk::PhysicalDeviceVulkan13Features {
            dynamic_rendering: vk::TRUE,
            ..Default::default()
        };
        assert!(!has_required_features(&full12, &no_sync2));

        let no_bda = vk::PhysicalDeviceVulkan12Features {
            descriptor_indexing: vk::TRUE,
            ..Default::default()
        };
        assert!(!has_required_features(&no_bda, &full13));
    }

    #[test]
    fn discrete_outranks_integrated() {
        assert!(
            device_type_rank(vk::PhysicalDeviceType::DISCRETE_GPU)
                > device_type_rank(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(
            device_type_rank(vk::PhysicalDeviceType::INTEGRATED_GPU)
                > device_type_rank(vk::PhysicalDeviceType::CPU)
        );
    }
}
