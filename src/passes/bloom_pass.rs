use super::shader_common::{
    create_fullscreen_pipeline, default_view, linear_sampler, sampled_texture_entry,
    sampler_entry,
};
use wgpu::{
    BindGroupLayout, LoadOp, Operations, RenderPassColorAttachment, RenderPipeline, Sampler,
    StoreOp,
};
use wgpu_frame_graph::{PassBuilder, PassContext, RenderPass, ResourceState, TextureHandle};

const BLOOM_FRAGMENT_SHADER: &str = "
@group(0) @binding(0)
var source_texture: texture_2d<f32>;

@group(0) @binding(1)
var source_sampler: sampler;

@fragment
fn fragment_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(source_texture, source_sampler, in.uv).rgb;
    let luminance = dot(color, vec3<f32>(0.2126, 0.7152, 0.0722));
    let weight = smoothstep(BLOOM_THRESHOLD, BLOOM_THRESHOLD + 0.1, luminance);
    return vec4<f32>(color * weight, 1.0);
}
";

pub struct BloomPipeline {
    pub pipeline: RenderPipeline,
    pub bind_group_layout: BindGroupLayout,
    pub sampler: Sampler,
}

impl BloomPipeline {
    pub fn new(device: &wgpu::Device, target_format: wgpu::TextureFormat, threshold: f32) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Bind Group Layout"),
            entries: &[sampled_texture_entry(0), sampler_entry(1)],
        });

        let fragment_source =
            format!("const BLOOM_THRESHOLD: f32 = {threshold:.3};\n{BLOOM_FRAGMENT_SHADER}");
        let pipeline = create_fullscreen_pipeline(
            device,
            "Bloom Pipeline",
            &fragment_source,
            &bind_group_layout,
            target_format,
        );

        Self {
            pipeline,
            bind_group_layout,
            sampler: linear_sampler(device, "Bloom Sampler"),
        }
    }
}

/// Bright-pass downsample of the scene color into a half resolution target.
///
/// Only runs when a later pass reads `output`.
pub struct BloomPass<'p> {
    pipeline: &'p BloomPipeline,
    input: TextureHandle,
    output: TextureHandle,
}

impl<'p> BloomPass<'p> {
    pub fn new(pipeline: &'p BloomPipeline, input: TextureHandle, output: TextureHandle) -> Self {
        Self {
            pipeline,
            input,
            output,
        }
    }
}

impl RenderPass<wgpu::Device> for BloomPass<'_> {
    fn name(&self) -> &str {
        "bloom_pass"
    }

    fn setup(&mut self, builder: &mut PassBuilder<'_, '_, wgpu::Device>) {
        builder.read_texture(self.input, ResourceState::ShaderResource);
        builder.write_texture(self.output, ResourceState::RenderTarget);
    }

    fn execute(&mut self, context: &mut PassContext<'_, '_, wgpu::Device>) {
        let (Some(input), Some(output)) =
            (context.texture(self.input), context.texture(self.output))
        else {
            return;
        };
        let input_view = default_view(input);
        let output_view = default_view(output);

        let bind_group = context
            .backend
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Bloom Bind Group"),
                layout: &self.pipeline.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&input_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.pipeline.sampler),
                    },
                ],
            });

        let mut render_pass = context.cmd.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Bloom Render Pass"),
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
}
