use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use penumbra_render_vulkan_3d::passes::lightning_pass::Technique;
use penumbra_render_vulkan_core::context::GraphicsContextConfig;
use penumbra_window::window::WindowConfig;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TechniqueArg {
    /// Lit without shadows.
    Simple,
    /// Lit with the shadow map sampled.
    Shadow,
}

impl From<TechniqueArg> for Technique {
    fn from(arg: TechniqueArg) -> Self {
        match arg {
            TechniqueArg::Simple => Technique::Simple,
            TechniqueArg::Shadow => Technique::ShadowMapped,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Window size {width}x{height} has a zero dimension")]
    ZeroExtent { width: u32, height: u32 },

    #[error("Light speed must be a positive finite number, got {0}")]
    InvalidLightSpeed(f32),
}

/// Shadow-mapped scene viewer on Vulkan.
#[derive(Debug, Clone, Parser)]
#[command(name = "penumbra", about = "Shadow-mapped scene viewer")]
pub struct AppConfig {
    /// Window width in pixels.
    #[arg(long, default_value_t = 800)]
    pub width: u32,

    /// Window height in pixels.
    #[arg(long, default_value_t = 600)]
    pub height: u32,

    /// Directory holding the compiled `*.vert.spv` / `*.frag.spv` files.
    #[arg(long, default_value = "penumbra_app/shaders")]
    pub shader_dir: PathBuf,

    /// Lighting technique used by the color pass.
    #[arg(long, value_enum, default_value_t = TechniqueArg::Shadow)]
    pub technique: TechniqueArg,

    /// Skip the Khronos validation layer.
    #[arg(long)]
    pub no_validation: bool,

    /// Arrow keys move the light by half this distance per frame.
    #[arg(long, default_value_t = 0.15)]
    pub light_speed: f32,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ZeroExtent {
                width: self.width,
                height: self.height,
            });
        }
        if !self.light_speed.is_finite() || self.light_speed <= 0.0 {
            return Err(ConfigError::InvalidLightSpeed(self.light_speed));
        }
        Ok(())
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            width: self.width,
            height: self.height,
            title: String::from("penumbra"),
            resizable: false,
        }
    }

    pub fn graphics_config(&self) -> GraphicsContextConfig {
        GraphicsContextConfig {
            enable_validation: !self.no_validation,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_is_well_formed() {
        AppConfig::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let config = AppConfig::try_parse_from(["penumbra"]).unwrap();
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.shader_dir, PathBuf::from("penumbra_app/shaders"));
        assert_eq!(Technique::from(config.technique), Technique::ShadowMapped);
        assert_eq!(config.light_speed, 0.15);
        assert!(config.graphics_config().enable_validation);
        assert!(!config.window_config().resizable);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_overrides() {
        let config = AppConfig::try_parse_from([
            "penumbra",
            "--technique",
            "simple",
            "--no-validation",
            "--width",
            "1024",
        ])
        .unwrap();
        assert_eq!(config.technique, TechniqueArg::Simple);
        assert!(!config.graphics_config().enable_validation);
        assert_eq!(config.window_config().width, 1024);
    }

    #[test]
    fn rejects_bad_values() {
        let config = AppConfig::try_parse_from(["penumbra", "--height", "0"]).unwrap();
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroExtent {
                width: 800,
                height: 0
            })
        );

        let config = AppConfig::try_parse_from(["penumbra", "--light-speed", "-1"]);
        assert!(config.is_err() || config.unwrap().validate().is_err());

        assert!(AppConfig::try_parse_from(["penumbra", "--technique", "ray"]).is_err());
    }
}
