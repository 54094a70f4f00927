mod analysis;
mod backend;
mod debug;
mod graph;
mod pass;
mod pool;
mod resource;
#[cfg(test)]
mod testing;

pub use backend::{Backend, TextureBarrier};
pub use debug::{DebugFlags, GraphDump, PassDump, PassStatistics, ResourceDump, UsageDump};
pub use graph::{FrameReport, RenderGraph};
pub use pass::{PassBuilder, PassContext, RenderPass};
pub use pool::{PoolConfig, PoolKey, PoolSlot, PoolStats, TransientPool};
pub use resource::{
    Access, ResourceKind, ResourceRegistry, ResourceState, ResourceUsage, TextureDesc,
    TextureHandle, TextureResource, TextureUsageFlags,
};

#[derive(Debug, thiserror::Error)]
pub enum RenderGraphError {
    #[error("Failed to allocate transient texture '{label}' ({width}x{height} {format:?}): {reason}")]
    TextureAllocation {
        label: String,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, RenderGraphError>;
