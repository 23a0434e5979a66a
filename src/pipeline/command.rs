//! Text control channel

/// Token that stops the pipeline (matched case-insensitively)
pub const QUIT_TOKEN: &str = "QUIT";

/// Commands accepted by a running pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Write a line to the source
    Send(String),
    /// Seal the current log and continue in a fresh one
    Rotate,
    /// Run the stop sequence
    Stop,
}

impl ControlCommand {
    /// Interpret one line typed by the operator
    ///
    /// Blank input yields `None`. Outbound text is sent exactly as typed.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.eq_ignore_ascii_case(QUIT_TOKEN) {
            return Some(ControlCommand::Stop);
        }
        Some(ControlCommand::Send(
            input.trim_end_matches(['\r', '\n']).to_string(),
        ))
    }
}
