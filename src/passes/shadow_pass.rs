use super::shader_common::default_view;
use wgpu::{LoadOp, Operations, RenderPassDepthStencilAttachment, StoreOp};
use wgpu_frame_graph::{PassBuilder, PassContext, RenderPass, ResourceState, TextureHandle};

/// Clears the imported shadow map to the far plane.
pub struct ShadowPass {
    shadow_map: TextureHandle,
}

impl ShadowPass {
    pub fn new(shadow_map: TextureHandle) -> Self {
        Self { shadow_map }
    }
}

impl RenderPass<wgpu::Device> for ShadowPass {
    fn name(&self) -> &str {
        "shadow_pass"
    }

    fn setup(&mut self, builder: &mut PassBuilder<'_, '_, wgpu::Device>) {
        builder.write_texture(self.shadow_map, ResourceState::DepthWrite);
    }

    fn execute(&mut self, context: &mut PassContext<'_, '_, wgpu::Device>) {
        let Some(shadow_map) = context.texture(self.shadow_map) else {
            log::warn!("Shadow map is not bound, skipping shadow pass");
            return;
        };
        let depth_view = default_view(shadow_map);

        let render_pass = context.cmd.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Shadow Render Pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                view: &depth_view,
                depth_ops: Some(Operations {
                    load: LoadOp::Clear(1.0),
                    store: StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        drop(render_pass);
    }
}
