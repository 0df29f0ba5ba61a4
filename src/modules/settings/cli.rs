// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use clap::{builder::ValueParser, Parser};
use std::path::PathBuf;

use crate::modules::account::entity::{
    ClientIdentity, Encryption, MailAccount, ServerConfig, DEFAULT_SUBJECT, DEFAULT_TIMEOUT_SECS,
};

#[derive(Debug, Parser)]
#[clap(
    name = "mailbridge",
    about = "Polls a mailbox over IMAP, turns new mail into events and answers over SMTP.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Settings {
    /// mailbridge log level (default: "info")
    #[clap(
        long,
        default_value = "info",
        env,
        help = "Set the log level for mailbridge"
    )]
    pub mailbridge_log_level: String,

    /// Enable ANSI logs (default: true)
    #[clap(long, default_value = "true", env, help = "Enable ANSI formatted logs")]
    pub mailbridge_ansi_logs: bool,

    /// Enable log file output (default: false)
    /// If false, logs will be printed to stdout
    #[clap(
        long,
        default_value = "false",
        env,
        help = "Enable log file output (otherwise logs go to stdout)"
    )]
    pub mailbridge_log_to_file: bool,

    #[clap(
        long,
        default_value = "logs",
        env,
        help = "Directory for rolling log files, created when missing"
    )]
    pub mailbridge_log_dir: PathBuf,

    /// Maximum number of log files (default: 5)
    #[clap(
        long,
        default_value = "5",
        env,
        help = "Set the maximum number of log files kept on disk"
    )]
    pub mailbridge_max_log_files: usize,

    #[clap(
        long,
        default_value = "30",
        env,
        help = "Seconds to wait between two INBOX polls",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub mailbridge_poll_interval_secs: u64,

    #[clap(
        long,
        env,
        help = "Address of the bot account, also used as IMAP and SMTP login",
        value_parser = ValueParser::new(|s: &str| {
            crate::modules::utils::validate_email(s)
                .map(|_| s.to_string())
                .map_err(|_| format!("Invalid email address: {}", s))
        })
    )]
    pub mailbridge_address: String,

    #[clap(
        long,
        env,
        hide_env_values = true,
        help = "Password or app token of the bot account"
    )]
    pub mailbridge_secret: String,

    #[clap(
        long,
        default_value = DEFAULT_SUBJECT,
        env,
        help = "Subject used when an outgoing mail does not specify one"
    )]
    pub mailbridge_subject: String,

    #[clap(long, env, help = "IMAP server host")]
    pub mailbridge_imap_host: String,

    #[clap(long, default_value = "993", env, help = "IMAP server port")]
    pub mailbridge_imap_port: u16,

    #[clap(
        long,
        value_enum,
        default_value = "ssl",
        env,
        help = "IMAP transport security (ssl, start-tls, none)"
    )]
    pub mailbridge_imap_encryption: Encryption,

    #[clap(long, env, help = "SMTP server host")]
    pub mailbridge_smtp_host: String,

    #[clap(long, default_value = "465", env, help = "SMTP server port")]
    pub mailbridge_smtp_port: u16,

    #[clap(
        long,
        value_enum,
        default_value = "ssl",
        env,
        help = "SMTP transport security (ssl, start-tls, none)"
    )]
    pub mailbridge_smtp_encryption: Encryption,

    #[clap(
        long,
        default_value = "30",
        env,
        help = "Timeout in seconds for a single network round trip",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub mailbridge_timeout_secs: u64,

    #[clap(long, env, help = "Client name reported through the IMAP ID command")]
    pub mailbridge_client_name: Option<String>,

    #[clap(long, env, help = "Client version reported through the IMAP ID command")]
    pub mailbridge_client_version: Option<String>,
}

impl Settings {
    pub fn account(&self) -> MailAccount {
        let defaults = ClientIdentity::default();
        let mut account = MailAccount::new(
            self.mailbridge_address.clone(),
            self.mailbridge_secret.clone(),
            ServerConfig::new(
                self.mailbridge_imap_host.clone(),
                self.mailbridge_imap_port,
                self.mailbridge_imap_encryption,
            ),
            ServerConfig::new(
                self.mailbridge_smtp_host.clone(),
                self.mailbridge_smtp_port,
                self.mailbridge_smtp_encryption,
            ),
        );
        account.subject = self.mailbridge_subject.clone();
        account.timeout_secs = self.mailbridge_timeout_secs;
        account.client = ClientIdentity {
            name: self
                .mailbridge_client_name
                .clone()
                .unwrap_or(defaults.name),
            version: self
                .mailbridge_client_version
                .clone()
                .unwrap_or(defaults.version),
        };
        account
    }

    #[cfg(test)]
    pub fn new_for_test() -> Self {
        Settings {
            mailbridge_log_level: "info".into(),
            mailbridge_ansi_logs: false,
            mailbridge_log_to_file: false,
            mailbridge_log_dir: PathBuf::from("logs"),
            mailbridge_max_log_files: 5,
            mailbridge_poll_interval_secs: 30,
            mailbridge_address: "bot@example.com".into(),
            mailbridge_secret: "secret".into(),
            mailbridge_subject: DEFAULT_SUBJECT.into(),
            mailbridge_imap_host: "imap.example.com".into(),
            mailbridge_imap_port: 993,
            mailbridge_imap_encryption: Encryption::Ssl,
            mailbridge_smtp_host: "smtp.example.com".into(),
            mailbridge_smtp_port: 587,
            mailbridge_smtp_encryption: Encryption::StartTls,
            mailbridge_timeout_secs: DEFAULT_TIMEOUT_SECS,
            mailbridge_client_name: None,
            mailbridge_client_version: None,
        }
    }
}
