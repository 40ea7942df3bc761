mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use fsrc_core::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref());

    // Respect RUST_LOG if set, then --verbose, then the config file's filter.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "framesource=debug,fsrc_engine=debug,fsrc_mp4=debug,fsrc_core=debug".to_string()
        } else {
            config
                .log_filter
                .clone()
                .unwrap_or_else(|| "framesource=info,fsrc_engine=warn,fsrc_mp4=warn".to_string())
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info { file, json } => commands::info(&file, &config, json),
        Commands::Frame {
            file,
            frame,
            output,
            track,
            seek_mode,
        } => {
            let mut options = config.video.clone();
            if let Some(track) = track {
                options.track = track;
            }
            if let Some(mode) = seek_mode {
                options.seek_mode = commands::parse_seek_mode(&mode)?;
            }
            commands::frame(&file, options, frame, &output)
        }
        Commands::Audio {
            file,
            start,
            length,
            output,
            track,
            sample_format,
            channels,
            sample_rate,
            keep_priming,
        } => {
            let mut options = config.audio.clone();
            if let Some(track) = track {
                options.track = track;
            }
            if let Some(format) = sample_format {
                options.sample_format = Some(format.parse()?);
            }
            if let Some(layout) = channels {
                options.channel_layout = Some(layout.parse()?);
            }
            if let Some(rate) = sample_rate {
                options.sample_rate = rate;
            }
            if keep_priming {
                options.skip_priming = false;
            }
            commands::audio(&file, &options, start, length, &output)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            commands::validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("framesource {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
