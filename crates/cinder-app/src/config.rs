// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cinder_render::{RenderSettings, RenderSize};
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "cinder.toml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file; missing is fine, defaults are used
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
    /// Initial window width in pixels
    #[arg(long)]
    pub width: Option<u32>,
    /// Initial window height in pixels
    #[arg(long)]
    pub height: Option<u32>,
    /// Force the validation layer on or off
    #[arg(long)]
    pub validation: Option<bool>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "Cinder".to_owned(),
            width: 1700,
            height: 900,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub frame_timeout_ms: u64,
    pub paused_sleep_ms: u64,
    pub validation: bool,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            frame_timeout_ms: 1000,
            paused_sleep_ms: 100,
            validation: cfg!(debug_assertions),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
}

impl AppCfg {
    /// Command-line values win over the file.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(w) = args.width {
            self.window.width = w;
        }
        if let Some(h) = args.height {
            self.window.height = h;
        }
        if let Some(v) = args.validation {
            self.render.validation = v;
        }
    }

    pub fn window_size(&self) -> RenderSize {
        RenderSize {
            width: self.window.width,
            height: self.window.height,
        }
    }

    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            frame_timeout: Duration::from_millis(self.render.frame_timeout_ms),
            validation: self.render.validation,
        }
    }

    pub fn paused_sleep(&self) -> Duration {
        Duration::from_millis(self.render.paused_sleep_ms)
    }
}

/// Malformed input is reported and replaced by defaults.
pub fn parse_cfg(text: &str, origin: &Path) -> AppCfg {
    match toml::from_str::<AppCfg>(text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("ignoring {}: {e}", origin.display());
            AppCfg::default()
        }
    }
}

pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => {
            info!("config: {}", path.display());
            parse_cfg(&s, path)
        }
        Err(_) => AppCfg::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> &'static Path {
        Path::new("test.toml")
    }

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse_cfg("", origin());
        assert_eq!(cfg, AppCfg::default());
        assert_eq!(cfg.window_size(), RenderSize { width: 1700, height: 900 });
        assert_eq!(cfg.render_settings().frame_timeout, Duration::from_secs(1));
        assert_eq!(cfg.paused_sleep(), Duration::from_millis(100));
        assert_eq!(cfg.window.title, "Cinder");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_cfg(
            r#"
            [window]
            width = 800

            [render]
            paused_sleep_ms = 250
            validation = false
            "#,
            origin(),
        );
        assert_eq!(cfg.window.width, 800);
        assert_eq!(cfg.window.height, 900);
        assert_eq!(cfg.render.frame_timeout_ms, 1000);
        assert_eq!(cfg.paused_sleep(), Duration::from_millis(250));
        assert!(!cfg.render_settings().validation);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let cfg = parse_cfg("[window\nwidth = \"wide\"", origin());
        assert_eq!(cfg, AppCfg::default());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load_cfg(Path::new("does/not/exist/cinder.toml"));
        assert_eq!(cfg, AppCfg::default());
    }

    #[test]
    fn cli_overrides_file() {
        let args = Args::try_parse_from([
            "cinder",
            "--width",
            "640",
            "--validation",
            "true",
        ])
        .expect("args");
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut cfg = parse_cfg("[window]\nwidth = 800\nheight = 600\n[render]\nvalidation = false", origin());
        cfg.apply_args(&args);
        assert_eq!(cfg.window_size(), RenderSize { width: 640, height: 600 });
        assert!(cfg.render.validation);
    }
}
