mod commands;
mod console_delegate;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use exciteometer_core::models::format::DEFAULT_SAMPLE_RATE;
use exciteometer_core::{AudioFormatSpec, CaptureConfiguration, CaptureSession, SessionRegistry};
use exciteometer_cpal::{list_input_devices, CpalMicDevice};

use commands::{Command, Flow};
use console_delegate::ConsoleDelegate;

#[derive(Parser, Debug)]
#[command(name = "exciteometer")]
#[command(about = "Record moments and rank them by how loud they were")]
struct Args {
    /// Where WAV files, sidecars and the temp store go
    /// (default: <Documents>/Exciteometer)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Capture sample rate in Hz
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    /// Channel count (1 or 2)
    #[arg(long, default_value_t = 1)]
    channels: u16,

    /// Input device name (default: system default microphone)
    #[arg(long)]
    device: Option<String>,

    /// End a capture after this many consecutive read errors
    #[arg(long)]
    max_read_errors: Option<u32>,

    /// Skip the JSON sidecar next to each WAV
    #[arg(long)]
    no_metadata: bool,

    /// Print input devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn default_output_dir() -> PathBuf {
    dirs_next::document_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Exciteometer")
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list_devices {
        for device in list_input_devices()? {
            println!("{}{}", device.name, if device.is_default { " (default)" } else { "" });
        }
        return Ok(());
    }

    let config = CaptureConfiguration {
        format: AudioFormatSpec::new(args.sample_rate, args.channels),
        output_directory: args.output_dir.unwrap_or_else(default_output_dir),
        max_consecutive_read_errors: args.max_read_errors,
        write_metadata: !args.no_metadata,
        ..Default::default()
    };
    log::info!("Output directory: {}", config.output_directory.display());

    let device = match args.device {
        Some(name) => CpalMicDevice::with_device(name),
        None => CpalMicDevice::default_device(),
    };

    let delegate = Arc::new(ConsoleDelegate::new());
    let mut session =
        CaptureSession::new(device, config, SessionRegistry::shared()).context("invalid capture configuration")?;
    session.set_delegate(delegate.clone());

    println!("{}", commands::HELP);
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            // EOF behaves like quit.
            commands::execute(Command::Quit, &mut session, &delegate)?;
            break;
        };

        let command = match Command::parse(&line?) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("{}", message);
                continue;
            }
        };

        if commands::execute(command, &mut session, &delegate)? == Flow::Exit {
            break;
        }
    }
    Ok(())
}
