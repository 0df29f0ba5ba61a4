// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ErrorCode {
    // Client-side errors (10000–10999)
    InvalidParameter = 10000,
    MissingConfiguration = 10020,
    UninitializedSession = 10100,

    // Network connection errors (40000–40999)
    NetworkError = 40000,
    ConnectionTimeout = 40010,

    // Mail service errors (50000–50999)
    ImapCommandFailed = 50000,
    ImapAuthenticationFailed = 50010,
    ImapUnexpectedResult = 50020,
    SmtpCommandFailed = 50030,
    SmtpRecipientsRefused = 50040,

    // Internal system errors (70000–70999)
    InternalError = 70000,
}

impl ErrorCode {
    pub fn is_network(&self) -> bool {
        matches!(self, ErrorCode::NetworkError | ErrorCode::ConnectionTimeout)
    }
}
