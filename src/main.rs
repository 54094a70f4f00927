use renderer_core::{Renderer, RendererConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let config = RendererConfig::from_env();
    let frame_count = config.frame_count;
    log::info!(
        "Rendering {} frames at {}x{}",
        frame_count,
        config.width,
        config.height
    );

    let mut renderer = match pollster::block_on(Renderer::new(config)) {
        Ok(renderer) => renderer,
        Err(error) => {
            log::error!("Failed to create renderer: {error}");
            return ExitCode::FAILURE;
        }
    };

    for frame in 0..frame_count {
        match renderer.render_frame() {
            Ok(report) => log::info!(
                "Frame {}: ran {:?}, culled {:?}, {} barriers",
                frame,
                report.executed_passes,
                report.culled_passes,
                report.barrier_count
            ),
            Err(error) => {
                log::error!("Frame {frame} failed: {error}");
                return ExitCode::FAILURE;
            }
        }
    }

    let stats = renderer.pool_stats();
    log::info!(
        "Transient pool: {} allocations, {} reuses, {} evictions",
        stats.allocations,
        stats.reuses,
        stats.evictions
    );
    ExitCode::SUCCESS
}
