// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section falls back to its defaults, so a partial file is fine.
// A missing or broken file means defaults for everything.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::rhi::{Extent2D, Format, PoolCapacities, PresentMode, SwapChainDesc};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub pools: PoolCapacities,
    pub debug: DebugConfig,
    pub shaders: ShaderConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "my-rhi".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub swapchain_images: u32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.1, 0.2, 0.8, 1.0],
            swapchain_images: 3,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            log_to_file: false,
            log_file: "my_rhi.log".to_string(),
            show_fps: true,
        }
    }
}

/// Shader sources and how to compile them
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub directory: PathBuf,
    pub compiler: String,
    pub hot_reload: bool,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("shaders"),
            compiler: "glslc".to_string(),
            hot_reload: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Present mode from its config name
    pub fn present_mode(&self) -> PresentMode {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => PresentMode::Immediate,
            "mailbox" => PresentMode::Mailbox,
            "fifo" => PresentMode::Fifo,
            "fifo_relaxed" => PresentMode::FifoRelaxed,
            _ => {
                log::warn!("Unknown present mode '{}', defaulting to FIFO", self.graphics.present_mode);
                PresentMode::Fifo
            }
        }
    }

    /// Swapchain request for a window of `width` x `height`
    pub fn swapchain_desc(&self, width: u32, height: u32) -> SwapChainDesc {
        SwapChainDesc {
            extent: Extent2D::new(width, height),
            image_count: self.graphics.swapchain_images,
            format: Format::B8G8R8A8Srgb,
            present_mode: self.present_mode(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.graphics.swapchain_images, 3);
        assert_eq!(config.pools, PoolCapacities::default());
        assert_eq!(config.shaders.compiler, "glslc");
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::parse(
            r#"
            [window]
            title = "demo"

            [graphics]
            present_mode = "Mailbox"
            clear_color = [0.0, 0.0, 0.0, 1.0]

            [pools]
            buffers = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "demo");
        assert_eq!(config.window.height, 720);
        assert_eq!(config.present_mode(), PresentMode::Mailbox);
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.pools.buffers, 16);
        assert_eq!(config.pools.images, PoolCapacities::default().images);
    }

    #[test]
    fn unknown_present_mode_falls_back_to_fifo() {
        let config = Config::parse("[graphics]\npresent_mode = \"vsync-ish\"\n").unwrap();
        assert_eq!(config.present_mode(), PresentMode::Fifo);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(Config::parse("[window]\nwidth = \"wide\"\n").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join(format!("my-rhi-no-config-{}.toml", std::process::id()));
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.window.title, "my-rhi");
    }

    #[test]
    fn swapchain_request_follows_graphics_section() {
        let config = Config::parse("[graphics]\nswapchain_images = 2\npresent_mode = \"immediate\"\n").unwrap();
        let desc = config.swapchain_desc(800, 600);
        assert_eq!(desc.extent, Extent2D::new(800, 600));
        assert_eq!(desc.image_count, 2);
        assert_eq!(desc.present_mode, PresentMode::Immediate);
    }
}
