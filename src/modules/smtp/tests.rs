// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use crate::modules::account::entity::{Encryption, MailAccount, ServerConfig};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::{ActionFailure, SmtpReply};
use crate::modules::message::Message;
use crate::modules::mime::{MailComposer, OutboundDocument};
use crate::modules::smtp::MailSender;

fn account() -> MailAccount {
    let mut account = MailAccount::new(
        "bot@example.com",
        "secret",
        ServerConfig::new("imap.example.com", 993, Encryption::Ssl),
        ServerConfig::new("smtp.example.com", 25, Encryption::None),
    );
    account.timeout_secs = 2;
    account
}

fn document(recipients: &[&str]) -> OutboundDocument {
    let recipients: Vec<String> = recipients.iter().map(|r| r.to_string()).collect();
    MailComposer::new(&account())
        .compose(&Message::from("status report"), &recipients, Some("Status"), None)
        .unwrap()
}

/// In-memory SMTP server. The responder may override the reply to any
/// command line; `None` falls back to a cooperative server.
struct ScriptedSmtpServer {
    commands: Arc<Mutex<Vec<String>>>,
    data: Arc<Mutex<String>>,
}

impl ScriptedSmtpServer {
    fn start(
        greeting: &'static str,
        mut responder: impl FnMut(&str) -> Option<String> + Send + 'static,
    ) -> (Self, DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let commands = Arc::new(Mutex::new(Vec::new()));
        let data = Arc::new(Mutex::new(String::new()));
        let (recorded, received) = (commands.clone(), data.clone());
        tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(server);
            let mut reader = BufReader::new(read_half);
            write_half.write_all(greeting.as_bytes()).await?;
            let mut in_data = false;
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).await? == 0 {
                    break;
                }
                if in_data {
                    if line == ".\r\n" {
                        in_data = false;
                        write_half.write_all(b"250 2.0.0 Ok: queued\r\n").await?;
                    } else {
                        received.lock().unwrap().push_str(&line);
                    }
                    continue;
                }
                let command = line.trim_end().to_string();
                recorded.lock().unwrap().push(command.clone());
                let reply = match responder(&command) {
                    Some(reply) => reply,
                    None => cooperative_reply(&command),
                };
                if command == "DATA" && reply.starts_with("354") {
                    in_data = true;
                }
                write_half.write_all(reply.as_bytes()).await?;
                write_half.flush().await?;
            }
            Ok::<_, std::io::Error>(())
        });
        (Self { commands, data }, client)
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn sent(&self, verb: &str) -> bool {
        self.commands().iter().any(|command| command.starts_with(verb))
    }

    fn data(&self) -> String {
        self.data.lock().unwrap().clone()
    }
}

const GREETING: &str = "220 smtp.example.com ESMTP ready\r\n";

fn cooperative_reply(command: &str) -> String {
    let verb = command
        .split([' ', ':'])
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    match verb.as_str() {
        "EHLO" => "250-smtp.example.com\r\n250-AUTH PLAIN\r\n250 8BITMIME\r\n".into(),
        "AUTH" => "235 2.7.0 Authentication successful\r\n".into(),
        "MAIL" | "RCPT" | "RSET" => "250 2.1.0 Ok\r\n".into(),
        "DATA" => "354 End data with <CR><LF>.<CR><LF>\r\n".into(),
        "QUIT" => "221 2.0.0 Bye\r\n".into(),
        _ => "502 5.5.2 Command not recognized\r\n".into(),
    }
}

fn refuse(address: &'static str) -> impl FnMut(&str) -> Option<String> + Send + 'static {
    move |command| {
        (command == format!("RCPT TO:<{}>", address))
            .then(|| "550 5.1.1 User unknown\r\n".to_string())
    }
}

fn smtp_replies(error: &crate::modules::error::MailBridgeError) -> Vec<(String, SmtpReply)> {
    match error.action_failure() {
        Some(ActionFailure::Smtp(replies)) => replies
            .iter()
            .map(|(address, reply)| (address.clone(), reply.clone()))
            .collect(),
        other => panic!("expected SMTP failure, got {:?}", other),
    }
}

#[tokio::test]
async fn delivers_to_every_recipient() {
    let (server, stream) = ScriptedSmtpServer::start(GREETING, |_| None);
    let sender = MailSender::new(&account());
    sender
        .send_over(stream, &document(&["alice@example.com", "carol@example.com"]))
        .await
        .unwrap();

    let commands = server.commands();
    assert!(commands.iter().any(|c| c.starts_with("AUTH PLAIN")));
    assert!(commands.contains(&"MAIL FROM:<bot@example.com>".to_string()));
    assert!(commands.contains(&"RCPT TO:<alice@example.com>".to_string()));
    assert!(commands.contains(&"RCPT TO:<carol@example.com>".to_string()));
    assert!(server.sent("DATA"));
    assert!(server.sent("QUIT"));
    assert!(server.data().contains("Subject: Status"));
}

#[tokio::test]
async fn partial_refusal_is_keyed_by_recipient() {
    let (server, stream) = ScriptedSmtpServer::start(GREETING, refuse("bob@example.com"));
    let sender = MailSender::new(&account());
    let error = sender
        .send_over(stream, &document(&["alice@example.com", "bob@example.com"]))
        .await
        .unwrap_err();

    assert_eq!(error.code(), ErrorCode::SmtpRecipientsRefused);
    let replies = smtp_replies(&error);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].0, "bob@example.com");
    assert_eq!(replies[0].1.code, 550);
    assert!(replies[0].1.message.contains("User unknown"));

    // The accepted recipient still gets the mail.
    assert!(server.sent("DATA"));
    assert!(server.data().contains("status report"));
}

#[tokio::test]
async fn refusing_everyone_skips_data() {
    let (server, stream) = ScriptedSmtpServer::start(GREETING, |command| {
        command
            .starts_with("RCPT")
            .then(|| "550 5.1.1 User unknown\r\n".to_string())
    });
    let sender = MailSender::new(&account());
    let error = sender
        .send_over(stream, &document(&["alice@example.com", "bob@example.com"]))
        .await
        .unwrap_err();

    let keys: Vec<String> = smtp_replies(&error).into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["alice@example.com", "bob@example.com"]);
    assert!(!server.sent("DATA"));
    assert!(server.sent("RSET"));
}

#[tokio::test]
async fn rejected_sender_is_keyed_by_account() {
    let (_server, stream) = ScriptedSmtpServer::start(GREETING, |command| {
        command
            .starts_with("MAIL FROM")
            .then(|| "553 5.7.1 Sender address rejected\r\n".to_string())
    });
    let sender = MailSender::new(&account());
    let error = sender
        .send_over(stream, &document(&["alice@example.com"]))
        .await
        .unwrap_err();

    let replies = smtp_replies(&error);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].0, "bot@example.com");
    assert_eq!(replies[0].1.code, 553);
}

#[tokio::test]
async fn failed_authentication_is_keyed_by_account() {
    let (server, stream) = ScriptedSmtpServer::start(GREETING, |command| {
        command
            .starts_with("AUTH")
            .then(|| "535 5.7.8 Authentication credentials invalid\r\n".to_string())
    });
    let sender = MailSender::new(&account());
    let error = sender
        .send_over(stream, &document(&["alice@example.com"]))
        .await
        .unwrap_err();

    let replies = smtp_replies(&error);
    assert_eq!(replies[0].0, "bot@example.com");
    assert_eq!(replies[0].1.code, 535);
    assert!(!server.sent("MAIL FROM"));
}

#[tokio::test]
async fn negative_greeting_is_an_action_failure() {
    let (_server, stream) =
        ScriptedSmtpServer::start("554 5.3.2 Service unavailable\r\n", |_| None);
    let sender = MailSender::new(&account());
    let error = sender
        .send_over(stream, &document(&["alice@example.com"]))
        .await
        .unwrap_err();
    assert_eq!(smtp_replies(&error)[0].1.code, 554);
}

#[tokio::test]
async fn closed_connection_is_a_network_error() {
    let (client, server) = tokio::io::duplex(1024);
    drop(server);
    let sender = MailSender::new(&account());
    let error = sender
        .send_over(client, &document(&["alice@example.com"]))
        .await
        .unwrap_err();
    assert!(error.is_network());
}
