// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
mod config;
mod dmx;
mod fixture;
mod lighting;
mod show;

use std::error::Error;
use std::path::PathBuf;

use clap::{crate_version, Parser, Subcommand};
use tracing::info;

use crate::lighting::LightingSystem;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=Art-Net DMX lighting engine

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/dmxctl
ExecStart=/usr/local/bin/dmxctl start "$SHOW"

[Install]
WantedBy=multi-user.target
Alias=dmxctl.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "An Art-Net DMX lighting engine."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Starts the engine and transmits to the show's devices.
    Start {
        /// The path to the show file.
        show_path: String,
        /// The path to the engine config.
        #[arg(short, long)]
        config: Option<String>,
        /// A sequence to start playing immediately.
        #[arg(short, long)]
        sequence: Option<String>,
    },
    /// Validates a show file.
    Check {
        /// The path to the show file.
        show_path: String,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            show_path,
            config,
            sequence,
        } => {
            let settings = config::Settings::load(config.map(PathBuf::from).as_deref())?;
            let show = show::load_show(&PathBuf::from(show_path))?;

            let system = LightingSystem::new();
            system.load(&show);
            let transmitter_cancel = system.start_transmitter(settings.transmit_rate_hz).await?;

            if let Some(sequence_id) = sequence {
                system.play_sequence(&sequence_id)?;
            }

            info!(
                rate_hz = settings.transmit_rate_hz,
                "Engine running. Press Ctrl-C to stop."
            );
            tokio::signal::ctrl_c().await?;

            // Blackout, then keep transmitting briefly so the zero frame
            // reaches the fixtures before the socket goes away.
            system.blackout();
            tokio::time::sleep(settings.shutdown_grace()?).await;
            let _ = transmitter_cancel.send(true);
        }
        Commands::Check { show_path } => {
            let show = show::load_show(&PathBuf::from(&show_path))?;
            println!("{} is valid:", show_path);
            println!("- {} devices", show.devices.len());
            println!("- {} groups", show.groups.len());
            println!("- {} scenes", show.scenes.len());
            println!("- {} effects", show.effects.len());
            println!("- {} sequences", show.sequences.len());
        }
        Commands::Systemd {} => print!("{}", SYSTEMD_SERVICE),
    }

    Ok(())
}
