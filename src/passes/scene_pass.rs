use super::shader_common::default_view;
use wgpu::{
    LoadOp, Operations, RenderPassColorAttachment, RenderPassDepthStencilAttachment, StoreOp,
};
use wgpu_frame_graph::{PassBuilder, PassContext, RenderPass, ResourceState, TextureHandle};

/// Main view: clears the transient scene color and the imported depth buffer,
/// sampling the shadow map produced earlier in the frame.
pub struct ScenePass {
    shadow_map: TextureHandle,
    color_output: TextureHandle,
    depth_output: TextureHandle,
    clear_color: wgpu::Color,
}

impl ScenePass {
    pub fn new(
        shadow_map: TextureHandle,
        color_output: TextureHandle,
        depth_output: TextureHandle,
        clear_color: wgpu::Color,
    ) -> Self {
        Self {
            shadow_map,
            color_output,
            depth_output,
            clear_color,
        }
    }
}

impl RenderPass<wgpu::Device> for ScenePass {
    fn name(&self) -> &str {
        "scene_pass"
    }

    fn setup(&mut self, builder: &mut PassBuilder<'_, '_, wgpu::Device>) {
        builder.read_texture(self.shadow_map, ResourceState::DepthRead);
        builder.write_texture(self.color_output, ResourceState::RenderTarget);
        builder.write_texture(self.depth_output, ResourceState::DepthWrite);
    }

    fn execute(&mut self, context: &mut PassContext<'_, '_, wgpu::Device>) {
        let (Some(color), Some(depth)) = (
            context.texture(self.color_output),
            context.texture(self.depth_output),
        ) else {
            log::warn!("Scene targets are not bound, skipping scene pass");
            return;
        };
        let color_view = default_view(color);
        let depth_view = default_view(depth);

        let render_pass = context.cmd.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Render Pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: &color_view,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(self.clear_color),
                    store: StoreOp::Store,
                },
            })],
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
