use anyhow::Result;

use exciteometer_core::{CaptureDevice, CaptureError, CaptureSession, CaptureState, Session};
use exciteometer_cpal::list_input_devices;

use crate::console_delegate::ConsoleDelegate;

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a capture; `None` takes the registry's default label.
    Start(Option<String>),
    Stop,
    List,
    /// Clear the registry and begin a new batch.
    NewBatch,
    Level,
    Devices,
    Help,
    Quit,
}

impl Command {
    /// Parse a prompt line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "start" | "s" => Self::Start((!rest.is_empty()).then(|| rest.to_string())),
            "stop" | "x" => Self::Stop,
            "list" | "ls" => Self::List,
            "new" => Self::NewBatch,
            "level" => Self::Level,
            "devices" => Self::Devices,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(format!("unknown command '{}', try 'help'", other)),
        };
        Ok(Some(command))
    }
}

pub const HELP: &str = "\
commands:
  start [label]   begin recording (default label: Entry N)
  stop            stop recording and score the session
  list            show sessions, loudest first
  new             clear the list and start a new batch
  level           show the latest loudness sample
  devices         list input devices
  quit            stop any recording and exit";

/// What the loop should do after a command.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub fn execute<D: CaptureDevice>(
    command: Command,
    session: &mut CaptureSession<D>,
    delegate: &ConsoleDelegate,
) -> Result<Flow> {
    match command {
        Command::Start(label) => {
            let label = label.unwrap_or_else(|| session.registry().lock().next_default_label());
            match session.start(&label) {
                Ok(()) => println!("recording '{}' (type 'stop' to finish)", label),
                Err(CaptureError::AlreadyRecording) => println!("already recording"),
                Err(e) => println!("could not start: {}", e),
            }
        }
        Command::Stop => match session.stop() {
            Ok(Some(committed)) => print_committed(&committed),
            Ok(None) => println!("not recording"),
            Err(e) => {
                println!("session finished with an error: {}", e);
                if let Some(committed) = finalized(session) {
                    print_committed(&committed);
                }
            }
        },
        Command::List => print_registry(&session.registry().lock().all()),
        Command::NewBatch => {
            session.registry().lock().clear();
            println!("new batch started");
        }
        Command::Level => match delegate.last_sample() {
            Some(decibel) => println!("{:.2} dB", decibel),
            None => println!("no samples yet"),
        },
        Command::Devices => {
            for device in list_input_devices()? {
                let marker = if device.is_default { "*" } else { " " };
                match (device.default_sample_rate, device.default_channels) {
                    (Some(rate), Some(channels)) => {
                        println!("{} {} ({} Hz, {} ch)", marker, device.name, rate, channels)
                    }
                    _ => println!("{} {}", marker, device.name),
                }
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {
            if session.state().is_recording() {
                if let Some(committed) = session.stop()? {
                    print_committed(&committed);
                }
            }
            return Ok(Flow::Exit);
        }
    }
    Ok(Flow::Continue)
}

fn finalized<D: CaptureDevice>(session: &CaptureSession<D>) -> Option<Session> {
    match session.state() {
        CaptureState::Finalized(committed) => Some(committed),
        _ => None,
    }
}

fn print_committed(session: &Session) {
    let path = session
        .output_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    println!("{}: {} dB → {}", session.label(), session.display_loudness(), path);
}

fn print_registry(sessions: &[Session]) {
    if sessions.is_empty() {
        println!("no sessions yet");
        return;
    }
    for (rank, session) in sessions.iter().enumerate() {
        println!("{:>3}. {:<24} {:>8} dB", rank + 1, session.label(), session.display_loudness());
    }
}
