mod pass_configs;
pub mod passes;

pub use pass_configs::{BloomConfig, LuminanceConfig, PassConfigs, ShadowConfig};

use passes::{
    BloomPass, BloomPipeline, CompositePass, CompositePipeline, LuminancePass, LuminancePipeline,
    ScenePass, ShadowPass,
};
use std::str::FromStr;
use web_time::Instant;
use wgpu::TextureFormat;
use wgpu_frame_graph::{
    DebugFlags, FrameReport, PoolConfig, PoolStats, RenderGraph, RenderGraphError, ResourceState,
    TextureDesc, TransientPool,
};

pub const BACK_BUFFER_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.19,
    g: 0.24,
    b: 0.42,
    a: 1.0,
};

#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("No compatible GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("Failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error(transparent)]
    RenderGraph(#[from] RenderGraphError),
}

pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub passes: PassConfigs,
    pub pool: PoolConfig,
    pub debug_flags: DebugFlags,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_count: 3,
            passes: PassConfigs::default(),
            pool: PoolConfig::default(),
            debug_flags: DebugFlags::empty(),
        }
    }
}

impl RendererConfig {
    pub const WIDTH_VAR: &'static str = "FRAME_GRAPH_WIDTH";
    pub const HEIGHT_VAR: &'static str = "FRAME_GRAPH_HEIGHT";
    pub const FRAMES_VAR: &'static str = "FRAME_GRAPH_FRAMES";
    pub const BLOOM_VAR: &'static str = "FRAME_GRAPH_BLOOM";
    pub const LUMINANCE_VAR: &'static str = "FRAME_GRAPH_LUMINANCE";

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from `lookup`, falling back to defaults for missing or
    /// unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let mut passes = PassConfigs::default();
        passes.bloom.enabled = parse_or(&lookup, Self::BLOOM_VAR, passes.bloom.enabled);
        passes.luminance.enabled =
            parse_or(&lookup, Self::LUMINANCE_VAR, passes.luminance.enabled);

        Self {
            width: parse_or(&lookup, Self::WIDTH_VAR, defaults.width).max(1),
            height: parse_or(&lookup, Self::HEIGHT_VAR, defaults.height).max(1),
            frame_count: parse_or(&lookup, Self::FRAMES_VAR, defaults.frame_count),
            passes,
            pool: defaults.pool,
            debug_flags: lookup(DebugFlags::ENV_VAR)
                .map(|value| DebugFlags::parse(&value))
                .unwrap_or_default(),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    let Some(value) = lookup(name) else {
        return default;
    };
    value.trim().parse().unwrap_or_else(|_| {
        log::warn!("Ignoring invalid {}={:?}", name, value);
        default
    })
}

/// Caller-owned textures imported into every frame's graph, with the state
/// each was left in by the previous frame.
struct FrameTargets {
    back_buffer: wgpu::Texture,
    back_buffer_state: ResourceState,
    depth: wgpu::Texture,
    depth_state: ResourceState,
    shadow_map: wgpu::Texture,
    shadow_map_state: ResourceState,
}

impl FrameTargets {
    fn new(device: &wgpu::Device, width: u32, height: u32, shadow_resolution: u32) -> Self {
        let attachment =
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        Self {
            back_buffer: create_target(
                device,
                "Back Buffer",
                width,
                height,
                BACK_BUFFER_FORMAT,
                attachment | wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC,
            ),
            back_buffer_state: ResourceState::Undefined,
            depth: create_target(device, "Depth Texture", width, height, DEPTH_FORMAT, attachment),
            depth_state: ResourceState::Undefined,
            shadow_map: create_target(
                device,
                "Shadow Map",
                shadow_resolution,
                shadow_resolution,
                DEPTH_FORMAT,
                attachment,
            ),
            shadow_map_state: ResourceState::Undefined,
        }
    }
}

fn create_target(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: TextureFormat,
    usage: wgpu::TextureUsages,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    })
}

struct Pipelines {
    luminance: LuminancePipeline,
    bloom: BloomPipeline,
    composite: CompositePipeline,
}

/// Headless renderer that rebuilds its frame graph every frame.
///
/// Owns the device, the externally visible targets and the transient pool
/// shared by every frame's graph.
pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: RendererConfig,
    targets: FrameTargets,
    pipelines: Pipelines,
    pool: TransientPool<wgpu::Device>,
    frame_index: u64,
}

impl Renderer {
    pub async fn new(config: RendererConfig) -> Result<Self, RendererError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        log::info!("WGPU Adapter: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("WGPU Device"),
                memory_hints: wgpu::MemoryHints::default(),
                required_features: wgpu::Features::default(),
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                trace: wgpu::Trace::Off,
            })
            .await?;

        let targets = FrameTargets::new(
            &device,
            config.width,
            config.height,
            config.passes.shadow.resolution,
        );
        let pipelines = Pipelines {
            luminance: LuminancePipeline::new(&device),
            bloom: BloomPipeline::new(&device, BACK_BUFFER_FORMAT, config.passes.bloom.threshold),
            composite: CompositePipeline::new(
                &device,
                BACK_BUFFER_FORMAT,
                config.passes.bloom.intensity,
            ),
        };
        let pool = TransientPool::new(config.pool.clone());

        Ok(Self {
            device,
            queue,
            config,
            targets,
            pipelines,
            pool,
            frame_index: 0,
        })
    }

    /// Declares, executes and submits one frame.
    pub fn render_frame(&mut self) -> Result<FrameReport, RendererError> {
        let frame_start = Instant::now();
        let (width, height) = (self.config.width, self.config.height);
        let shadow_resolution = self.config.passes.shadow.resolution;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Graph Encoder"),
            });

        let report = {
            let targets = &mut self.targets;
            let mut graph = RenderGraph::<wgpu::Device>::with_debug_flags(self.config.debug_flags);

            let back_buffer = graph.import_texture(
                "back_buffer",
                &targets.back_buffer,
                &mut targets.back_buffer_state,
                TextureDesc::new(width, height, BACK_BUFFER_FORMAT),
            );
            let depth = graph.import_texture(
                "depth",
                &targets.depth,
                &mut targets.depth_state,
                TextureDesc::new(width, height, DEPTH_FORMAT),
            );
            let shadow_map = graph.import_texture(
                "shadow_map",
                &targets.shadow_map,
                &mut targets.shadow_map_state,
                TextureDesc::new(shadow_resolution, shadow_resolution, DEPTH_FORMAT),
            );
            let scene_color = graph.register_texture(
                "scene_color",
                TextureDesc::new(width, height, BACK_BUFFER_FORMAT),
            );
            let bloom = graph.register_texture(
                "bloom",
                TextureDesc::new((width / 2).max(1), (height / 2).max(1), BACK_BUFFER_FORMAT),
            );

            graph.add_render_pass(ShadowPass::new(shadow_map));
            graph.add_render_pass(ScenePass::new(shadow_map, scene_color, depth, CLEAR_COLOR));
            if self.config.passes.luminance.enabled {
                graph.add_render_pass(LuminancePass::new(&self.pipelines.luminance, scene_color));
            }
            // Declared unconditionally; culled when the composite does not read it.
            graph.add_render_pass(BloomPass::new(&self.pipelines.bloom, scene_color, bloom));
            graph.add_render_pass(CompositePass::new(
                &self.pipelines.composite,
                scene_color,
                self.config.passes.bloom.enabled.then_some(bloom),
                back_buffer,
            ));
            graph.add_pass(
                "present",
                |_: &mut (), builder| {
                    builder.read_texture(back_buffer, ResourceState::Present);
                },
                |_, _| {},
            );

            graph.execute(&self.device, &mut self.pool, &mut encoder)?
        };

        self.queue.submit(Some(encoder.finish()));
        self.frame_index += 1;

        log::debug!(
            "Frame {} recorded in {:?}: {} passes run, {} culled, {} barriers",
            self.frame_index,
            frame_start.elapsed(),
            report.executed_passes.len(),
            report.culled_passes.len(),
            report.barrier_count
        );
        for statistics in &report.pass_statistics {
            log::info!(
                "  {} (#{}) took {:?}",
                statistics.pass_name,
                statistics.pass_index,
                statistics.execution_time
            );
        }

        Ok(report)
    }

    /// Recreates the imported targets and drops pooled textures that can no
    /// longer match a request.
    pub fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.config.width, self.config.height) {
            return;
        }

        self.config.width = width;
        self.config.height = height;
        self.targets = FrameTargets::new(
            &self.device,
            width,
            height,
            self.config.passes.shadow.resolution,
        );
        let evicted = self.pool.trim();
        log::info!("Resized to {width}x{height}, released {evicted} pooled textures");
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RendererConfig {
        &mut self.config
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn pooled_texture_count(&self) -> usize {
        self.pool.len()
    }

    pub fn back_buffer_state(&self) -> ResourceState {
        self.targets.back_buffer_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        move |name| values.get(name).cloned()
    }

    #[test]
    fn config_defaults_when_unset() {
        let config = RendererConfig::from_lookup(lookup_from(&[]));
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.frame_count, 3);
        assert!(config.passes.bloom.enabled);
        assert!(config.debug_flags.is_empty());
    }

    #[test]
    fn config_reads_overrides() {
        let config = RendererConfig::from_lookup(lookup_from(&[
            (RendererConfig::WIDTH_VAR, "640"),
            (RendererConfig::HEIGHT_VAR, " 360 "),
            (RendererConfig::FRAMES_VAR, "10"),
            (RendererConfig::BLOOM_VAR, "false"),
            (DebugFlags::ENV_VAR, "timing,barriers"),
        ]));
        assert_eq!((config.width, config.height), (640, 360));
        assert_eq!(config.frame_count, 10);
        assert!(!config.passes.bloom.enabled);
        assert!(config.passes.luminance.enabled);
        assert_eq!(
            config.debug_flags,
            DebugFlags::PASS_TIMING | DebugFlags::LOG_BARRIERS
        );
    }

    #[test]
    fn invalid_config_values_fall_back() {
        let config = RendererConfig::from_lookup(lookup_from(&[
            (RendererConfig::WIDTH_VAR, "wide"),
            (RendererConfig::HEIGHT_VAR, "0"),
            (RendererConfig::BLOOM_VAR, "maybe"),
        ]));
        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 1);
        assert!(config.passes.bloom.enabled);
    }

    fn test_renderer(config: RendererConfig) -> Option<Renderer> {
        match pollster::block_on(Renderer::new(config)) {
            Ok(renderer) => Some(renderer),
            Err(error) => {
                eprintln!("No GPU available, skipping: {error}");
                None
            }
        }
    }

    #[test]
    fn frames_reuse_pooled_textures() {
        let config = RendererConfig {
            width: 64,
            height: 64,
            ..RendererConfig::default()
        };
        let Some(mut renderer) = test_renderer(config) else {
            return;
        };

        let first = renderer.render_frame().unwrap();
        let allocations = renderer.pool_stats().allocations;
        let second = renderer.render_frame().unwrap();

        assert_eq!(first.executed_passes, second.executed_passes);
        assert_eq!(renderer.pool_stats().allocations, allocations);
        assert_eq!(renderer.back_buffer_state(), ResourceState::Present);
        assert_eq!(renderer.frame_index(), 2);
    }

    #[test]
    fn disabled_bloom_is_culled() {
        let mut config = RendererConfig {
            width: 64,
            height: 64,
            ..RendererConfig::default()
        };
        config.passes.bloom.enabled = false;
        let Some(mut renderer) = test_renderer(config) else {
            return;
        };

        let report = renderer.render_frame().unwrap();

        assert_eq!(report.culled_passes, vec!["bloom_pass".to_string()]);
        assert!(report.executed_passes.iter().any(|name| name == "luminance_pass"));
    }

    #[test]
    fn resize_trims_the_pool() {
        let config = RendererConfig {
            width: 64,
            height: 64,
            ..RendererConfig::default()
        };
        let Some(mut renderer) = test_renderer(config) else {
            return;
        };

        renderer.render_frame().unwrap();
        assert!(renderer.pooled_texture_count() > 0);

        renderer.resize(32, 32);
        assert_eq!(renderer.pooled_texture_count(), 0);
        renderer.render_frame().unwrap();
        assert_eq!(renderer.back_buffer_state(), ResourceState::Present);
    }
}
