// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;
use std::fmt::{self, Formatter};

use code::ErrorCode;
use snafu::{Location, Snafu};

pub mod code;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MailBridgeError {
    #[snafu(display("{message}"))]
    Generic {
        message: String,
        #[snafu(implicit)]
        location: Location,
        code: ErrorCode,
    },
    /// The server understood the command and refused it.
    #[snafu(display("action failed: {failure}"))]
    ActionFailed {
        failure: ActionFailure,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type MailBridgeResult<T, E = MailBridgeError> = std::result::Result<T, E>;

impl MailBridgeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MailBridgeError::Generic { code, .. } => *code,
            MailBridgeError::ActionFailed { failure, .. } => match failure {
                ActionFailure::Imap { .. } => ErrorCode::ImapCommandFailed,
                ActionFailure::Smtp(_) => ErrorCode::SmtpRecipientsRefused,
            },
        }
    }

    /// Transport-level failures: the connection is unusable and the caller's
    /// polling loop is expected to retry with a fresh one.
    pub fn is_network(&self) -> bool {
        self.code().is_network()
    }

    pub fn action_failure(&self) -> Option<&ActionFailure> {
        match self {
            MailBridgeError::ActionFailed { failure, .. } => Some(failure),
            MailBridgeError::Generic { .. } => None,
        }
    }
}

/// Reply line of an SMTP server for one refused recipient (or for the whole
/// transaction when keyed by the sending account).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub message: String,
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionFailure {
    /// A tagged NO/BAD answer. `response` is the server text, decoded lossily.
    Imap { command: String, response: String },
    /// Keyed by recipient address, or by the account address when the server
    /// rejected the transaction as a whole.
    Smtp(BTreeMap<String, SmtpReply>),
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ActionFailure::Imap { command, response } => {
                write!(f, "IMAP command `{}` failed: {}", command, response)
            }
            ActionFailure::Smtp(replies) => {
                let details = replies
                    .iter()
                    .map(|(address, reply)| format!("{}: {}", address, reply))
                    .collect::<Vec<String>>()
                    .join(", ");
                write!(f, "SMTP server refused [{}]", details)
            }
        }
    }
}
