// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use cinder_render::RenderError;

/// Collects single-descriptor bindings and turns them into a set layout.
#[derive(Debug, Default)]
pub struct DescriptorLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binding(&mut self, binding: u32, kind: vk::DescriptorType) -> &mut Self {
        self.bindings.push(vk::DescriptorSetLayoutBinding {
            binding,
            descriptor_type: kind,
            descriptor_count: 1,
            ..Default::default()
        });
        self
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }

    /// Every binding is made visible to `stages`. The builder keeps its
    /// bindings, so it can be reused for a second layout.
    pub unsafe fn build(
        &mut self,
        device: &ash::Device,
        stages: vk::ShaderStageFlags,
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> Result<vk::DescriptorSetLayout, RenderError> {
        for b in &mut self.bindings {
            b.stage_flags |= stages;
        }
        let info = vk::DescriptorSetLayoutCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
            flags,
            binding_count: self.bindings.len() as u32,
            p_bindings: self.bindings.as_ptr(),
            ..Default::default()
        };
        device
            .create_descriptor_set_layout(&info, None)
            .map_err(|e| RenderError::api("vkCreateDescriptorSetLayout", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_hold_one_descriptor_each() {
        let mut builder = DescriptorLayoutBuilder::new();
        builder
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .add_binding(1, vk::DescriptorType::UNIFORM_BUFFER);

        let b = builder.bindings();
        assert_eq!(b.len(), 2);
        assert_eq!(b[0].binding, 0);
        assert_eq!(b[0].descriptor_type, vk::DescriptorType::STORAGE_IMAGE);
        assert_eq!(b[1].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert!(b.iter().all(|b| b.descriptor_count == 1));
        assert!(b.iter().all(|b| b.stage_flags.is_empty()));
    }

    #[test]
    fn clear_drops_all_bindings() {
        let mut builder = DescriptorLayoutBuilder::new();
        builder.add_binding(0, vk::DescriptorType::STORAGE_IMAGE);
        builder.clear();
        assert!(builder.bindings().is_empty());
    }
}
