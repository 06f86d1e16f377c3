// ConsoleBridge - Connects a terminal to the running engine
//
// Two background threads:
// 1. stdin reader: parses line commands and forwards them through the ControlSurface
// 2. state printer: subscribes to SessionManager changes and prints label updates
//
// Both are plain threads with blocking reads, so the single-threaded engine
// runtime is never blocked by console I/O.

use crate::state::StateChange;
use crate::ui::controller::{ControlCommand, ControlSurface, describe_change};
use std::io::{BufRead, Write};
use tokio::sync::broadcast;

const HELP: &str = "Commands: [r] toggle reading, [l] toggle liking, [e] export, [s] status, [q] quit";

pub struct ConsoleBridge {
    surface: ControlSurface,
}

impl ConsoleBridge {
    pub fn new(surface: ControlSurface) -> Self {
        Self { surface }
    }

    /// Print the banner and start the stdin and state threads
    pub fn spawn(self) {
        let labels = self.surface.labels();
        println!("{}", HELP);
        println!("[{}] [{}]", labels.reading, labels.liking);

        Self::spawn_state_printer(self.surface.session().subscribe());

        let surface = self.surface;
        std::thread::spawn(move || {
            tracing::debug!("Console input thread started");
            let stdin = std::io::stdin();

            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!("Failed to read console input: {}", e);
                        break;
                    }
                };

                match surface.handle_line(&line) {
                    Some(ControlCommand::Quit) => break,
                    Some(_) => {}
                    None if line.trim().is_empty() => {}
                    None => println!("{}", HELP),
                }
            }

            tracing::debug!("Console input thread terminated");
        });
    }

    fn spawn_state_printer(mut rx: broadcast::Receiver<StateChange>) {
        std::thread::spawn(move || {
            tracing::debug!("State subscription thread started");

            loop {
                match rx.blocking_recv() {
                    Ok(change) => {
                        tracing::trace!("State change received: {:?}", change);
                        if let Some(text) = describe_change(&change) {
                            let mut stdout = std::io::stdout().lock();
                            let _ = writeln!(stdout, "{}", text);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Console missed {} state updates", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            tracing::debug!("State subscription thread terminated");
        });
    }
}
