use crate::{RenderGraphError, Result};
use crate::resource::{ResourceState, TextureDesc, TextureHandle, TextureUsageFlags};
use wgpu::{Extent3d, TextureDescriptor, TextureUsages};

/// A single state transition submitted before a pass runs.
pub struct TextureBarrier<'t, T> {
    pub handle: TextureHandle,
    pub name: &'t str,
    pub texture: &'t T,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// The device and command-recording contract the graph needs from a GPU API.
///
/// The graph never inspects `Texture` or `CommandContext`; it only hands them
/// to passes and to [`Backend::transition_textures`].
pub trait Backend {
    type Texture;
    type CommandContext;

    /// Called on a transient pool miss. Errors are not retried.
    fn create_texture(
        &self,
        label: &str,
        desc: &TextureDesc,
        usage: TextureUsageFlags,
    ) -> Result<Self::Texture>;

    /// Records one batch of transitions. Never called with an empty slice.
    fn transition_textures(
        &self,
        cmd: &mut Self::CommandContext,
        barriers: &[TextureBarrier<'_, Self::Texture>],
    );
}

pub(crate) fn wgpu_usages(desc: &TextureDesc, usage: TextureUsageFlags) -> TextureUsages {
    let mut usages = TextureUsages::TEXTURE_BINDING;

    if !desc.format.is_depth_stencil_format() {
        usages |= TextureUsages::COPY_SRC | TextureUsages::COPY_DST;
    }

    if usage.intersects(TextureUsageFlags::RENDER_TARGET | TextureUsageFlags::DEPTH_STENCIL) {
        usages |= TextureUsages::RENDER_ATTACHMENT;
    }

    if usage.contains(TextureUsageFlags::UNORDERED_ACCESS) {
        usages |= TextureUsages::STORAGE_BINDING;
    }

    usages
}

pub(crate) fn exceeds_limits(desc: &TextureDesc, limits: &wgpu::Limits) -> Option<String> {
    let max = limits.max_texture_dimension_2d;
    if desc.width == 0 || desc.height == 0 {
        return Some("texture has a zero extent".to_string());
    }
    (desc.width > max || desc.height > max)
        .then(|| format!("extent exceeds max_texture_dimension_2d ({max})"))
}

impl Backend for wgpu::Device {
    type Texture = wgpu::Texture;
    type CommandContext = wgpu::CommandEncoder;

    fn create_texture(
        &self,
        label: &str,
        desc: &TextureDesc,
        usage: TextureUsageFlags,
    ) -> Result<wgpu::Texture> {
        let descriptor = TextureDescriptor {
            label: Some(label),
            size: Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: wgpu_usages(desc, usage),
            view_formats: &[],
        };

        let allocation_error = |reason: String| RenderGraphError::TextureAllocation {
            label: label.to_string(),
            width: desc.width,
            height: desc.height,
            format: desc.format,
            reason,
        };

        if let Some(reason) = exceeds_limits(desc, &self.limits()) {
            return Err(allocation_error(reason));
        }

        // Scopes pop innermost first.
        self.push_error_scope(wgpu::ErrorFilter::Validation);
        self.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = wgpu::Device::create_texture(self, &descriptor);
        let out_of_memory = pollster::block_on(self.pop_error_scope());
        let validation = pollster::block_on(self.pop_error_scope());

        match out_of_memory.or(validation) {
            Some(error) => Err(allocation_error(error.to_string())),
            None => Ok(texture),
        }
    }

    fn transition_textures(
        &self,
        _cmd: &mut wgpu::CommandEncoder,
        barriers: &[TextureBarrier<'_, wgpu::Texture>],
    ) {
        // wgpu derives pipeline barriers from its own usage tracking.
        for barrier in barriers {
            log::trace!(
                "wgpu transition '{}': {:?} -> {:?}",
                barrier.name,
                barrier.before,
                barrier.after
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::TextureFormat;

    #[test]
    fn oversized_textures_are_rejected_before_creation() {
        let limits = wgpu::Limits::downlevel_defaults();
        let max = limits.max_texture_dimension_2d;

        let fits = TextureDesc::new(max, max, TextureFormat::Rgba8Unorm);
        assert_eq!(exceeds_limits(&fits, &limits), None);

        let too_wide = TextureDesc::new(max + 1, 16, TextureFormat::Rgba8Unorm);
        assert!(exceeds_limits(&too_wide, &limits).is_some());

        let empty = TextureDesc::new(0, 16, TextureFormat::Rgba8Unorm);
        assert!(exceeds_limits(&empty, &limits).is_some());
    }

    #[test]
    fn render_targets_get_attachment_usage() {
        let desc = TextureDesc::new(512, 512, TextureFormat::Rgba8Unorm);
        let usages = wgpu_usages(&desc, TextureUsageFlags::RENDER_TARGET);
        assert!(usages.contains(TextureUsages::RENDER_ATTACHMENT));
        assert!(usages.contains(TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_SRC));
        assert!(!usages.contains(TextureUsages::STORAGE_BINDING));
    }

    #[test]
    fn depth_targets_skip_copy_usage() {
        let desc = TextureDesc::new(512, 512, TextureFormat::Depth32Float);
        let usages = wgpu_usages(&desc, TextureUsageFlags::DEPTH_STENCIL);
        assert!(usages.contains(TextureUsages::RENDER_ATTACHMENT));
        assert!(!usages.contains(TextureUsages::COPY_DST));
    }

    #[test]
    fn unordered_access_maps_to_storage() {
        let desc = TextureDesc::new(256, 256, TextureFormat::Rgba16Float);
        let usages = wgpu_usages(&desc, TextureUsageFlags::UNORDERED_ACCESS);
        assert!(usages.contains(TextureUsages::STORAGE_BINDING));
        assert!(!usages.contains(TextureUsages::RENDER_ATTACHMENT));
    }
}
