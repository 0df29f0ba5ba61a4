// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

pub mod client;
pub mod executor;
pub mod session;
#[cfg(test)]
pub(crate) mod tests;

pub use executor::{normalize_mailbox_name, MailSession, SessionStatus, INBOX};
