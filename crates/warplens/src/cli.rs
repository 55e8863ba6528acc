use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use renderer::EffectKind;

#[derive(Parser, Debug)]
#[command(
    name = "warplens",
    author,
    version,
    about = "Camera distortion preview and benchmarking daemon"
)]
pub struct Args {
    /// V4L2 device node to capture from.
    #[arg(long, value_name = "PATH", default_value = "/dev/video0")]
    pub device: PathBuf,

    /// Override the preview window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Effect active at startup: `none`, `fisheye-hq`, `fisheye-fast`,
    /// `ripple`, or `swirl`.
    #[arg(long, default_value = "none")]
    pub effect: EffectKind,

    /// Initial effect strength; clamped to [0, 1].
    #[arg(long, default_value_t = 0.5)]
    pub strength: f32,

    /// Start in passthrough mode (camera shown unmodified).
    #[arg(long)]
    pub passthrough: bool,

    /// Run the automatic benchmark sweep and exit once it completes.
    #[arg(long)]
    pub benchmark: bool,
}

pub fn parse() -> Args {
    Args::parse()
}

/// Parses a `WIDTHxHEIGHT` override.
pub fn parse_window_size(value: &str) -> Result<(u32, u32)> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow::anyhow!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid width in '{value}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid height in '{value}'"))?;
    if width == 0 || height == 0 {
        anyhow::bail!("window size must be non-zero");
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_size_parsing() {
        assert_eq!(parse_window_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_window_size("640X480").unwrap(), (640, 480));
        assert!(parse_window_size("1280").is_err());
        assert!(parse_window_size("0x720").is_err());
        assert!(parse_window_size("axb").is_err());
    }

    #[test]
    fn effect_flag_accepts_every_label() {
        for kind in EffectKind::ALL {
            let parsed: EffectKind = kind.label().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }
}
