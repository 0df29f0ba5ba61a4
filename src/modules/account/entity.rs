// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;
use std::time::Duration;

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailBridgeResult;
use crate::{raise_error, validate_email};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SUBJECT: &str = "Mail from mailbridge";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One mailbox the bridge acts as.
#[derive(Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct MailAccount {
    /// Address used as login name, envelope sender and `From` header
    pub address: String,
    /// Password or app-specific token, shared by IMAP and SMTP
    pub secret: String,
    /// Subject used when an outgoing mail does not specify one
    #[serde(default = "default_subject")]
    pub subject: String,
    /// IMAP server configuration
    pub imap: ServerConfig,
    /// SMTP server configuration
    pub smtp: ServerConfig,
    /// Identity reported through the IMAP `ID` command after login
    #[serde(default)]
    pub client: ClientIdentity,
    /// Upper bound for a single network round trip
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_subject() -> String {
    DEFAULT_SUBJECT.into()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl fmt::Debug for MailAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailAccount")
            .field("address", &self.address)
            .field("secret", &"******")
            .field("subject", &self.subject)
            .field("imap", &self.imap)
            .field("smtp", &self.smtp)
            .field("client", &self.client)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl MailAccount {
    pub fn new(
        address: impl Into<String>,
        secret: impl Into<String>,
        imap: ServerConfig,
        smtp: ServerConfig,
    ) -> Self {
        Self {
            address: address.into(),
            secret: secret.into(),
            subject: default_subject(),
            imap,
            smtp,
            client: ClientIdentity::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn validate(&self) -> MailBridgeResult<()> {
        validate_email!(&self.address)?;
        if self.secret.is_empty() {
            return Err(raise_error!(
                format!("account '{}' has no secret configured", self.address),
                ErrorCode::MissingConfiguration
            ));
        }
        self.imap.validate("imap")?;
        self.smtp.validate("smtp")
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server hostname or IP address
    pub host: String,
    /// Server port number
    pub port: u16,
    /// Connection encryption method
    #[serde(default)]
    pub encryption: Encryption,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16, encryption: Encryption) -> Self {
        Self {
            host: host.into(),
            port,
            encryption,
        }
    }

    fn validate(&self, protocol: &str) -> MailBridgeResult<()> {
        if self.host.trim().is_empty() {
            return Err(raise_error!(
                format!("{} host is not configured", protocol),
                ErrorCode::MissingConfiguration
            ));
        }
        if self.port == 0 {
            return Err(raise_error!(
                format!("{} port must be between 1 and 65535", protocol),
                ErrorCode::InvalidParameter
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Default, Debug, Eq, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Encryption {
    /// SSL/TLS encrypted connection
    #[default]
    Ssl,
    /// StartTLS encryption
    StartTls,
    /// Unencrypted connection
    None,
}

impl From<bool> for Encryption {
    fn from(value: bool) -> Self {
        if value {
            Self::Ssl
        } else {
            Self::None
        }
    }
}

/// Some providers (163.com and friends) refuse to serve unidentified clients.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub name: String,
    pub version: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}
