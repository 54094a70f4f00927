use super::shader_common::default_view;
use wgpu::{BindGroupLayout, ComputePipeline};
use wgpu_frame_graph::{
    PassBuilder, PassContext, RenderPass, ResourceState, TextureDesc, TextureHandle,
};

pub const LUMINANCE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

const LUMINANCE_SHADER: &str = "
@group(0) @binding(0)
var input_texture: texture_2d<f32>;

@group(0) @binding(1)
var output_texture: texture_storage_2d<r32float, write>;

@compute @workgroup_size(8, 8)
fn compute_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let texture_size = textureDimensions(input_texture);

    if (global_id.x >= texture_size.x || global_id.y >= texture_size.y) {
        return;
    }

    let coords = vec2<i32>(i32(global_id.x), i32(global_id.y));
    let color = textureLoad(input_texture, coords, 0).rgb;
    let luminance = dot(color, vec3<f32>(0.2126, 0.7152, 0.0722));
    textureStore(output_texture, coords, vec4<f32>(luminance, 0.0, 0.0, 1.0));
}
";

pub struct LuminancePipeline {
    pub pipeline: ComputePipeline,
    pub bind_group_layout: BindGroupLayout,
}

impl LuminancePipeline {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Luminance Shader"),
            source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Borrowed(LUMINANCE_SHADER)),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Luminance Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: LUMINANCE_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Luminance Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Luminance Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: Some("compute_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            pipeline,
            bind_group_layout,
        }
    }
}

/// Writes per-pixel luminance of the scene into a graph-owned storage
/// texture. Nothing in the frame reads the result, so the pass is kept alive
/// explicitly.
pub struct LuminancePass<'p> {
    pipeline: &'p LuminancePipeline,
    input: TextureHandle,
    output: TextureHandle,
}

impl<'p> LuminancePass<'p> {
    pub fn new(pipeline: &'p LuminancePipeline, input: TextureHandle) -> Self {
        Self {
            pipeline,
            input,
            output: TextureHandle::INVALID,
        }
    }
}

impl RenderPass<wgpu::Device> for LuminancePass<'_> {
    fn name(&self) -> &str {
        "luminance_pass"
    }

    fn setup(&mut self, builder: &mut PassBuilder<'_, '_, wgpu::Device>) {
        let Some(input_desc) = builder.texture_desc(self.input).copied() else {
            log::warn!("Luminance input {:?} is not registered", self.input);
            return;
        };

        self.output = builder.create_texture(
            "luminance",
            TextureDesc::new(input_desc.width, input_desc.height, LUMINANCE_FORMAT),
        );
        builder.read_texture(self.input, ResourceState::ShaderResource);
        builder.write_texture(self.output, ResourceState::UnorderedAccess);
        builder.keep_alive();
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
                label: Some("Luminance Bind Group"),
                layout: &self.pipeline.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&input_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&output_view),
                    },
                ],
            });

        let size = output.size();
        let mut compute_pass = context
            .cmd
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Luminance Compute Pass"),
                timestamp_writes: None,
            });

        compute_pass.set_pipeline(&self.pipeline.pipeline);
        compute_pass.set_bind_group(0, &bind_group, &[]);
        compute_pass.dispatch_workgroups(size.width.div_ceil(8), size.height.div_ceil(8), 1);
    }
}
