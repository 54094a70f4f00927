use super::shader_common::{
    create_fullscreen_pipeline, default_view, linear_sampler, sampled_texture_entry,
    sampler_entry,
};
use wgpu::{
    BindGroupLayout, LoadOp, Operations, RenderPassColorAttachment, RenderPipeline, Sampler,
    StoreOp,
};
use wgpu_frame_graph::{PassBuilder, PassContext, RenderPass, ResourceState, TextureHandle};

const COMPOSITE_FRAGMENT_SHADER: &str = "
@group(0) @binding(0)
var scene_texture: texture_2d<f32>;

@group(0) @binding(1)
var bloom_texture: texture_2d<f32>;

@group(0) @binding(2)
var composite_sampler: sampler;

@fragment
fn fragment_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let scene = textureSample(scene_texture, composite_sampler, in.uv).rgb;
    let bloom = textureSample(bloom_texture, composite_sampler, in.uv).rgb;
    return vec4<f32>(scene + bloom * BLOOM_INTENSITY, 1.0);
}
";

pub struct CompositePipeline {
    pub pipeline: RenderPipeline,
    pub bind_group_layout: BindGroupLayout,
    pub sampler: Sampler,
}

impl CompositePipeline {
    pub fn new(device: &wgpu::Device, target_format: wgpu::TextureFormat, intensity: f32) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Composite Bind Group Layout"),
            entries: &[
                sampled_texture_entry(0),
                sampled_texture_entry(1),
                sampler_entry(2),
            ],
        });

        let fragment_source =
            format!("const BLOOM_INTENSITY: f32 = {intensity:.3};\n{COMPOSITE_FRAGMENT_SHADER}");
        let pipeline = create_fullscreen_pipeline(
            device,
            "Composite Pipeline",
            &fragment_source,
            &bind_group_layout,
            target_format,
        );

        Self {
            pipeline,
            bind_group_layout,
            sampler: linear_sampler(device, "Composite Sampler"),
        }
    }
}

/// Resolves the frame into the back buffer.
///
/// With a bloom input the two are blended by a fullscreen draw; without one
/// the scene color is copied, which leaves the bloom pass without a reader.
pub struct CompositePass<'p> {
    pipeline: &'p CompositePipeline,
    scene: TextureHandle,
    bloom: Option<TextureHandle>,
    output: TextureHandle,
}

impl<'p> CompositePass<'p> {
    pub fn new(
        pipeline: &'p CompositePipeline,
        scene: TextureHandle,
        bloom: Option<TextureHandle>,
        output: TextureHandle,
    ) -> Self {
        Self {
            pipeline,
            scene,
            bloom,
            output,
        }
    }

    fn blend(&self, context: &mut PassContext<'_, '_, wgpu::Device>, bloom: TextureHandle) {
        let (Some(scene), Some(bloom), Some(output)) = (
            context.texture(self.scene),
            context.texture(bloom),
            context.texture(self.output),
        ) else {
            return;
        };
        let scene_view = default_view(scene);
        let bloom_view = default_view(bloom);
        let output_view = default_view(output);

        let bind_group = context
            .backend
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Composite Bind Group"),
                layout: &self.pipeline.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&scene_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&bloom_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&self.pipeline.sampler),
                    },
                ],
            });

        let mut render_pass = context.cmd.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Composite Render Pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: &output_view,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(wgpu::Color::BLACK),
                    store: StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.pipeline.pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }

    fn copy(&self, context: &mut PassContext<'_, '_, wgpu::Device>) {
        let (Some(scene), Some(output)) =
            (context.texture(self.scene), context.texture(self.output))
        else {
            return;
        };

        context.cmd.copy_texture_to_texture(
            scene.as_image_copy(),
            output.as_image_copy(),
            scene.size(),
        );
    }
}

impl RenderPass<wgpu::Device> for CompositePass<'_> {
    fn name(&self) -> &str {
        "composite_pass"
    }

    fn setup(&mut self, builder: &mut PassBuilder<'_, '_, wgpu::Device>) {
        match self.bloom {
            Some(bloom) => {
                builder.read_texture(self.scene, ResourceState::ShaderResource);
                builder.read_texture(bloom, ResourceState::ShaderResource);
                builder.write_texture(self.output, ResourceState::RenderTarget);
            }
            None => {
                builder.read_texture(self.scene, ResourceState::CopySource);
                builder.write_texture(self.output, ResourceState::CopyDest);
            }
        }
    }

    fn execute(&mut self, context: &mut PassContext<'_, '_, wgpu::Device>) {
        match self.bloom {
            Some(bloom) => self.blend(context, bloom),
            None => self.copy(context),
        }
    }
}
