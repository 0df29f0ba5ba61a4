// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use mail_parser::{Addr as ParsedAddr, Address as ParsedAddress};
use serde::{Deserialize, Serialize};

use crate::modules::message::Message;

/// A mailbox participating in a mail. Identity is the address alone.
#[derive(Clone, Debug, Default, Eq, Serialize, Deserialize)]
pub struct User {
    /// Mailbox address, e.g. `alice@example.com`
    pub id: String,
    /// Display name, empty when the header carried none
    pub name: String,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Hash for User {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "<{}>", self.id)
        } else {
            write!(f, "{} <{}>", self.name, self.id)
        }
    }
}

impl<'x> From<&ParsedAddr<'x>> for User {
    fn from(original: &ParsedAddr<'x>) -> Self {
        User {
            id: original
                .address
                .as_ref()
                .map(|s| s.to_string())
                .unwrap_or_default(),
            name: original
                .name
                .as_ref()
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
        }
    }
}

/// Flattens address lists and groups, skipping entries without an address.
pub(crate) fn users_of(address: Option<&ParsedAddress<'_>>) -> Vec<User> {
    let Some(address) = address else {
        return Vec::new();
    };
    let users: Vec<User> = match address {
        ParsedAddress::List(addrs) => addrs.iter().map(User::from).collect(),
        ParsedAddress::Group(groups) => groups
            .iter()
            .flat_map(|group| group.addresses.iter().map(User::from))
            .collect(),
    };
    users.into_iter().filter(|user| !user.id.is_empty()).collect()
}

/// Snapshot of one retrieved mail.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mail {
    /// `Message-ID` header, trimmed, angle brackets included
    pub id: String,
    pub sender: User,
    pub recipients_to: Vec<User>,
    pub recipients_cc: Vec<User>,
    pub recipients_bcc: Vec<User>,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    /// Offset of the `Date` header from UTC, in hours
    pub timezone: Option<f32>,
    /// Plain-text parts followed by attachments
    pub message: Message,
    /// HTML parts followed by the same attachments
    pub original_message: Message,
    /// `In-Reply-To` header, trimmed
    pub in_reply_to: Option<String>,
}

impl Mail {
    pub fn is_addressed_to(&self, address: &str) -> bool {
        self.recipients_to.iter().any(|user| user.id == address)
    }
}
