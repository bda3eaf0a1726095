// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::process;

use clap::Parser;

use pose_overlay::CancelToken;
use pose_overlay::cli::args::{Cli, Commands};
use pose_overlay::cli::run::{run_image, run_video};
use pose_overlay::{error, warn};

fn main() {
    let cli = Cli::parse();

    let token = CancelToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("Failed to install Ctrl-C handler: {e}");
    }

    let result = match &cli.command {
        Commands::Image(args) => run_image(args),
        Commands::Video(args) => run_video(args, &token).map(|_| ()),
    };

    if let Err(e) = result {
        error!("{e}");
        process::exit(1);
    }
}
