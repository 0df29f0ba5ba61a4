// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

pub mod composer;
pub mod parser;

pub use composer::{MailComposer, OutboundDocument, OutgoingMail};
pub use parser::parse;
