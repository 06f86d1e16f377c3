// Control Surface - user toggles for the reader
//
// Two toggles mirror the persisted flags. Their labels always describe the
// action a press would take, so they are derived from the session, never
// stored.

use crate::engine::AutoReaderHandle;
use crate::models::SessionState;
use crate::state::{SessionManager, StateChange};

/// A user action on the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    ToggleReading,
    ToggleLiking,
    /// Export the displayed topic to Markdown
    Export,
    Status,
    Quit,
}

impl ControlCommand {
    /// Parse a console line (`r`, `l`, `e`, `s`, `q` or their long forms)
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "r" | "read" | "reading" => Some(Self::ToggleReading),
            "l" | "like" | "liking" => Some(Self::ToggleLiking),
            "e" | "export" => Some(Self::Export),
            "s" | "status" => Some(Self::Status),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

pub fn reading_label(enabled: bool) -> &'static str {
    if enabled { "Stop reading" } else { "Start reading" }
}

pub fn liking_label(enabled: bool) -> &'static str {
    if enabled { "Stop liking" } else { "Start liking" }
}

/// Current toggle labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlLabels {
    pub reading: &'static str,
    pub liking: &'static str,
}

impl ControlLabels {
    pub fn from_state(state: &SessionState) -> Self {
        Self {
            reading: reading_label(state.reading_enabled),
            liking: liking_label(state.liking_enabled),
        }
    }
}

/// Text shown for a state change, or `None` if the surface ignores it
pub fn describe_change(change: &StateChange) -> Option<String> {
    match change {
        StateChange::ReadingChanged { enabled } => Some(format!(
            "Reading {} [{}]",
            if *enabled { "on" } else { "off" },
            reading_label(*enabled)
        )),
        StateChange::LikingChanged { enabled } => Some(format!(
            "Liking {} [{}]",
            if *enabled { "on" } else { "off" },
            liking_label(*enabled)
        )),
        StateChange::ReactionRecorded { count } => Some(format!("Reactions: {}", count)),
        StateChange::ItemDequeued { id, remaining } => {
            Some(format!("Reading topic {} ({} queued)", id, remaining))
        }
        StateChange::QueueReplaced { .. } => None,
    }
}

/// Forwards user commands to the engine and reports the current labels
#[derive(Clone)]
pub struct ControlSurface {
    handle: AutoReaderHandle,
    session: SessionManager,
}

impl ControlSurface {
    pub fn new(handle: AutoReaderHandle, session: SessionManager) -> Self {
        Self { handle, session }
    }

    pub fn labels(&self) -> ControlLabels {
        self.session.read(ControlLabels::from_state)
    }

    /// Send a command to the engine. Returns `false` once the engine is gone.
    pub fn dispatch(&self, command: ControlCommand) -> bool {
        tracing::debug!("Control command: {:?}", command);
        self.handle.send(command)
    }

    /// Parse and dispatch one input line
    pub fn handle_line(&self, line: &str) -> Option<ControlCommand> {
        let command = ControlCommand::parse(line)?;
        self.dispatch(command);
        Some(command)
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }
}
