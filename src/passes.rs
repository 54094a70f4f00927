pub mod bloom_pass;
pub mod composite_pass;
pub mod luminance_pass;
pub mod scene_pass;
pub mod shader_common;
pub mod shadow_pass;

pub use bloom_pass::{BloomPass, BloomPipeline};
pub use composite_pass::{CompositePass, CompositePipeline};
pub use luminance_pass::{LuminancePass, LuminancePipeline};
pub use scene_pass::ScenePass;
pub use shadow_pass::ShadowPass;
