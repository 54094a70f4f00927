pub struct BloomConfig {
    pub enabled: bool,
    pub threshold: f32,
    pub intensity: f32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.8,
            intensity: 0.6,
        }
    }
}

pub struct ShadowConfig {
    pub resolution: u32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self { resolution: 2048 }
    }
}

pub struct LuminanceConfig {
    pub enabled: bool,
}

impl Default for LuminanceConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Default)]
pub struct PassConfigs {
    pub bloom: BloomConfig,
    pub shadow: ShadowConfig,
    pub luminance: LuminanceConfig,
}
