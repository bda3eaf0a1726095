// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::DISPLAY_HEIGHT;
use crate::download::DEFAULT_POSE_MODEL;
use crate::visualizer::Color;

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Examples:
    pose-overlay image --source person.jpg --output overlay.png
    pose-overlay image -s a.jpg -s b.jpg --show
    pose-overlay video --source 0 --show
    pose-overlay video --source clip.mp4 --fps 30 --max-frames 300 --composite --show
    pose-overlay video --source rtsp://camera.local/stream --verbose false"#)]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Overlay the skeleton on still images
    Image(ImageArgs),
    /// Overlay the skeleton on a live camera, video file or stream
    Video(VideoArgs),
}

/// Options shared by both modes.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Path to ONNX pose model; a bare file name is downloaded if missing
    #[arg(short, long, default_value = DEFAULT_POSE_MODEL)]
    pub model: String,

    /// Minimum body detection score
    #[arg(long, default_value_t = 0.5)]
    pub conf: f32,

    /// Maximum number of bodies per frame
    #[arg(long, default_value_t = 1)]
    pub num_poses: usize,

    /// Model input size
    #[arg(long)]
    pub imgsz: Option<usize>,

    /// Connector color (name or #RRGGBB)
    #[arg(long)]
    pub connector_color: Option<Color>,

    /// Point color (name or #RRGGBB)
    #[arg(long)]
    pub point_color: Option<Color>,

    /// Show verbose output
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub verbose: bool,
}

/// Arguments for the image command.
#[derive(Args, Debug)]
pub struct ImageArgs {
    /// Image to process; repeat to select several in a row (only the last is kept)
    #[arg(short, long, required = true)]
    pub source: Vec<PathBuf>,

    /// Write the rendered canvas to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Display the result in a window
    #[arg(long, default_value_t = false)]
    pub show: bool,

    /// Canvas height in pixels
    #[arg(long, default_value_t = DISPLAY_HEIGHT)]
    pub display_height: u32,

    #[command(flatten)]
    pub model: ModelArgs,
}

/// Arguments for the video command.
#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct VideoArgs {
    /// Camera index, video file or stream URL
    #[arg(short, long, default_value = "0")]
    pub source: String,

    /// Refresh rate of the loop (0 runs as fast as frames arrive)
    #[arg(long, default_value_t = 60.0, value_parser = parse_fps)]
    pub fps: f64,

    /// Stop after this many frames
    #[arg(long)]
    pub max_frames: Option<usize>,

    /// Display the overlay in a window
    #[arg(long, default_value_t = false)]
    pub show: bool,

    /// Draw the video frame under the overlay
    #[arg(long, default_value_t = false)]
    pub composite: bool,

    #[command(flatten)]
    pub model: ModelArgs,
}

/// Parse a refresh rate: a finite, non-negative number.
fn parse_fps(s: &str) -> Result<f64, String> {
    let fps: f64 = s.parse().map_err(|e| format!("invalid rate '{s}': {e}"))?;
    if !fps.is_finite() || fps < 0.0 {
        return Err(format!("rate must be a finite number >= 0, got {s}"));
    }
    Ok(fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_image_args_defaults() {
        let args = Cli::parse_from(["app", "image", "--source", "person.jpg"]);
        match args.command {
            Commands::Image(image) => {
                assert_eq!(image.source, vec![PathBuf::from("person.jpg")]);
                assert_eq!(image.display_height, 480);
                assert_eq!(image.model.model, DEFAULT_POSE_MODEL);
                assert!((image.model.conf - 0.5).abs() < f32::EPSILON);
                assert_eq!(image.model.num_poses, 1);
                assert!(image.model.verbose);
                assert!(image.output.is_none());
                assert!(!image.show);
            }
            Commands::Video(_) => panic!("expected image command"),
        }
    }

    #[test]
    fn test_image_requires_source() {
        assert!(Cli::try_parse_from(["app", "image"]).is_err());
    }

    #[test]
    fn test_video_args_custom() {
        let args = Cli::parse_from([
            "app",
            "video",
            "--source",
            "clip.mp4",
            "--fps",
            "30",
            "--max-frames",
            "100",
            "--connector-color",
            "#00FFFF",
            "--verbose",
            "false",
        ]);
        match args.command {
            Commands::Video(video) => {
                assert_eq!(video.source, "clip.mp4");
                assert!((video.fps - 30.0).abs() < f64::EPSILON);
                assert_eq!(video.max_frames, Some(100));
                assert_eq!(video.model.connector_color, Some(Color(0, 255, 255)));
                assert!(!video.model.verbose);
            }
            Commands::Image(_) => panic!("expected video command"),
        }
    }

    #[test]
    fn test_video_defaults_to_first_camera() {
        let args = Cli::parse_from(["app", "video"]);
        let Commands::Video(video) = args.command else {
            panic!("expected video command");
        };
        assert_eq!(video.source, "0");
        assert!((video.fps - 60.0).abs() < f64::EPSILON);
        assert!(!video.composite);
    }

    #[test]
    fn test_video_fps_validation() {
        assert!(Cli::try_parse_from(["app", "video", "--fps", "-1"]).is_err());
        assert!(Cli::try_parse_from(["app", "video", "--fps", "inf"]).is_err());
        assert!(Cli::try_parse_from(["app", "video", "--fps", "fast"]).is_err());

        let args = Cli::parse_from(["app", "video", "--fps", "1e-30"]);
        let Commands::Video(video) = args.command else {
            panic!("expected video command");
        };
        let config = crate::config::LoopConfig::new().with_fps(video.fps);
        assert_eq!(config.refresh_interval, crate::config::MAX_REFRESH_INTERVAL);
    }
}
