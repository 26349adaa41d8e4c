// SPDX-FileCopyrightText: 2026 Fieldops Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tolerant text-command recognition.
//!
//! Commands arrive as free text, typed or sent by quick-reply buttons.
//! Matching is case-insensitive on the trimmed text and accepts the listed
//! synonyms; anything else is not a command and falls through to the
//! state-dependent text handling.

/// A recognized text command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Begin registration ("register").
    Register,
    /// Start the check-in flow ("check in", "checkin").
    StartCheckin,
    /// Start the submission flow ("submit", "submission").
    StartSubmission,
    /// Close the open transaction as done ("done", "finish", "yes"...).
    Finish,
    /// Abort the open transaction ("cancel"...).
    Cancel,
}

impl Command {
    pub fn parse(text: &str) -> Option<Command> {
        let t = text.trim().to_lowercase();
        match t.as_str() {
            "register" => Some(Command::Register),
            "check in" | "checkin" => Some(Command::StartCheckin),
            "submit" | "submission" => Some(Command::StartSubmission),
            "done" | "finish" | "finished" | "yes" | "y" => Some(Command::Finish),
            "cancel" | "cancel check-in" | "cancel checkin" | "cancel submission" => {
                Some(Command::Cancel)
            }
            _ => None,
        }
    }
}
