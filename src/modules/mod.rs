// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

pub mod account;
pub mod bot;
pub mod common;
pub mod error;
pub mod event;
pub mod imap;
pub mod logger;
pub mod message;
pub mod mime;
pub mod model;
pub mod settings;
pub mod smtp;
pub mod utils;
