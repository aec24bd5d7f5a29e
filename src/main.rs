//! pose-coach - replay a recorded landmark stream through a guided exercise.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use pose_coach::coach::{FrameSize, Phase, SessionTimings};
use pose_coach::host::{self, HostConfig};

#[derive(Parser, Debug)]
#[command(name = "pose-coach", about = "Joint-angle exercise coach (headless replay)")]
struct Cli {
    /// Exercise document (JSON)
    #[arg(long, default_value = "exercise.json")]
    config: PathBuf,

    /// Recorded landmark stream (one JSON frame per line, `null` for no body)
    #[arg(long, default_value = "frames.jsonl")]
    frames: PathBuf,

    /// Time a pose must be held correctly before advancing (ms)
    #[arg(long, default_value_t = 3000.0, value_parser = parse_non_negative)]
    hold_ms: f64,

    /// How long the pose description is shown (ms)
    #[arg(long, default_value_t = 5000.0, value_parser = parse_non_negative)]
    description_ms: f64,

    /// How long the demonstration image is shown (ms)
    #[arg(long, default_value_t = 5000.0, value_parser = parse_non_negative)]
    image_ms: f64,

    /// Degrees of slack on both ends of every angle range
    #[arg(long, default_value_t = 10.0, value_parser = parse_non_negative)]
    tolerance: f64,

    /// Delay between replayed frames (ms)
    #[arg(long, default_value_t = 33)]
    frame_interval_ms: u64,

    /// Display width used for pixel-space joint points
    #[arg(long, default_value_t = 640.0)]
    width: f32,

    /// Display height used for pixel-space joint points
    #[arg(long, default_value_t = 480.0)]
    height: f32,

    /// Exit after N seconds
    #[arg(long)]
    exit_after: Option<u64>,
}

/// Accept only finite, non-negative numbers.
fn parse_non_negative(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("expected a finite, non-negative number, got {s}"));
    }
    Ok(value)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pose_coach=info".into()),
        )
        .init();

    info!("pose-coach v{} starting", env!("CARGO_PKG_VERSION"));

    let config = HostConfig {
        config_path: cli.config,
        frames_path: cli.frames,
        timings: SessionTimings {
            hold_ms: cli.hold_ms,
            description_ms: cli.description_ms,
            image_ms: cli.image_ms,
            tolerance_deg: cli.tolerance,
            ..SessionTimings::default()
        },
        frame_interval_ms: cli.frame_interval_ms,
        frame_size: FrameSize::new(cli.width, cli.height),
        exit_after: cli.exit_after,
        ..HostConfig::default()
    };

    let summary = host::run(config)?;
    info!(
        "Session ended in phase {} after {} frame(s)",
        summary.final_phase.as_str(),
        summary.frames_replayed
    );

    if summary.final_phase.is_error() {
        std::process::exit(1);
    }
    if summary.final_phase != Phase::Completed {
        info!("Exercise not completed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_flags_reject_unusable_values() {
        assert_eq!(parse_non_negative("250"), Ok(250.0));
        assert_eq!(parse_non_negative("0"), Ok(0.0));
        for bad in ["inf", "NaN", "-1", "abc"] {
            assert!(parse_non_negative(bad).is_err(), "{bad} accepted");
        }
        assert!(Cli::try_parse_from(["pose-coach", "--description-ms", "inf"]).is_err());
        assert!(Cli::try_parse_from(["pose-coach", "--hold-ms", "1500"]).is_ok());
    }
}
