// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use crate::modules::account::entity::{ClientIdentity, Encryption, MailAccount, ServerConfig};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::ActionFailure;
use crate::modules::imap::{MailSession, SessionStatus};

pub(crate) fn test_account() -> MailAccount {
    let mut account = MailAccount::new(
        "bot@example.com",
        "secret",
        ServerConfig::new("imap.example.com", 993, Encryption::Ssl),
        ServerConfig::new("smtp.example.com", 465, Encryption::Ssl),
    );
    account.client = ClientIdentity {
        name: "bridge-test".into(),
        version: "1.0".into(),
    };
    account.timeout_secs = 1;
    account
}

/// In-memory IMAP server answering each tagged command through a responder.
/// `{tag}` in a reply is replaced with the command's tag; an empty reply
/// leaves the command unanswered.
pub(crate) struct ScriptedImapServer {
    commands: Arc<Mutex<Vec<String>>>,
}

impl ScriptedImapServer {
    pub(crate) fn start(
        mut responder: impl FnMut(&str) -> String + Send + 'static,
    ) -> (Self, DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let commands = Arc::new(Mutex::new(Vec::new()));
        let recorded = commands.clone();
        tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(server);
            let mut reader = BufReader::new(read_half);
            write_half
                .write_all(b"* OK IMAP4rev1 scripted server ready\r\n")
                .await?;
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).await? == 0 {
                    break;
                }
                let received = line.trim_end();
                let (tag, command) = received.split_once(' ').unwrap_or((received, ""));
                recorded.lock().unwrap().push(command.to_string());
                let reply = responder(command).replace("{tag}", tag);
                if reply.is_empty() {
                    continue;
                }
                write_half.write_all(reply.as_bytes()).await?;
                write_half.flush().await?;
            }
            Ok::<_, std::io::Error>(())
        });
        (Self { commands }, client)
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

/// Replies of a well-behaved server with one INBOX and one Sent mailbox.
pub(crate) fn standard_reply(command: &str) -> String {
    let verb = command.split(' ').next().unwrap_or_default();
    match verb {
        "LOGIN" => "{tag} OK LOGIN completed\r\n".into(),
        "ID" => "{tag} OK ID completed\r\n".into(),
        "SELECT" => {
            "* 2 EXISTS\r\n* 0 RECENT\r\n{tag} OK [READ-WRITE] SELECT completed\r\n".into()
        }
        "LIST" => concat!(
            "* LIST (\\HasNoChildren) \"/\" \"INBOX\"\r\n",
            "* LIST (\\HasNoChildren \\Sent) \"/\" \"Sent Messages\"\r\n",
            "{tag} OK LIST completed\r\n"
        )
        .into(),
        "LOGOUT" => "* BYE Logging out\r\n{tag} OK LOGOUT completed\r\n".into(),
        "UID" if command.starts_with("UID SEARCH") => {
            "* SEARCH\r\n{tag} OK SEARCH completed\r\n".into()
        }
        "UID" => "{tag} OK FETCH completed\r\n".into(),
        _ => "{tag} BAD unknown command\r\n".into(),
    }
}

/// `UID FETCH` answer carrying `raw` as an RFC822 literal.
pub(crate) fn fetch_reply(uid: u32, raw: &str) -> String {
    format!(
        "* 1 FETCH (UID {} RFC822 {{{}}}\r\n{})\r\n{{tag}} OK FETCH completed\r\n",
        uid,
        raw.len(),
        raw
    )
}

async fn logged_in(
    responder: impl FnMut(&str) -> String + Send + 'static,
) -> (MailSession, ScriptedImapServer) {
    let (server, stream) = ScriptedImapServer::start(responder);
    let session = MailSession::new(&test_account());
    session.connect_with_stream(Box::new(stream)).await.unwrap();
    assert!(session.login("bot@example.com", "secret").await.unwrap());
    (session, server)
}

#[tokio::test]
async fn login_identifies_the_client() {
    let (session, server) = logged_in(standard_reply).await;
    assert_eq!(session.state().await, SessionStatus::Authenticated);

    let commands = server.commands();
    assert_eq!(commands[0], "LOGIN \"bot@example.com\" \"secret\"");
    assert_eq!(
        commands[1],
        "ID (\"name\" \"bridge-test\" \"version\" \"1.0\")"
    );
}

#[tokio::test]
async fn rejected_login_keeps_the_connection() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let (_server, stream) = ScriptedImapServer::start(move |command| {
        if command.starts_with("LOGIN") && counter.fetch_add(1, Ordering::SeqCst) == 0 {
            return "{tag} NO [AUTHENTICATIONFAILED] Invalid credentials\r\n".into();
        }
        standard_reply(command)
    });
    let session = MailSession::new(&test_account());
    session.connect_with_stream(Box::new(stream)).await.unwrap();

    assert!(!session.login("bot@example.com", "wrong").await.unwrap());
    assert_eq!(session.state().await, SessionStatus::Connected);

    assert!(session.login("bot@example.com", "secret").await.unwrap());
    assert_eq!(session.state().await, SessionStatus::Authenticated);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rejected_id_still_allows_logout() {
    let (server, stream) = ScriptedImapServer::start(|command| {
        if command.starts_with("ID") {
            return "{tag} BAD ID not supported\r\n".into();
        }
        standard_reply(command)
    });
    let session = MailSession::new(&test_account());
    session.connect_with_stream(Box::new(stream)).await.unwrap();

    assert!(!session.login("bot@example.com", "secret").await.unwrap());
    assert_eq!(session.state().await, SessionStatus::Authenticated);
    assert!(session.logout().await.unwrap());
    assert_eq!(session.state().await, SessionStatus::Disconnected);
    assert_eq!(server.commands().last().unwrap(), "LOGOUT");
}

#[tokio::test]
async fn quoted_and_bare_mailbox_names_select_identically() {
    let (session, server) = logged_in(standard_reply).await;

    assert!(session.select_mailbox("Sent Messages").await.unwrap());
    assert!(session.select_mailbox("\"Sent Messages\"").await.unwrap());
    assert!(session.select_mailbox("INBOX").await.unwrap());

    let selects: Vec<String> = server
        .commands()
        .into_iter()
        .filter(|command| command.starts_with("SELECT"))
        .collect();
    assert_eq!(
        selects,
        vec![
            "SELECT \"Sent Messages\"",
            "SELECT \"Sent Messages\"",
            "SELECT INBOX"
        ]
    );
    assert_eq!(session.selected_mailbox().await.as_deref(), Some("INBOX"));
}

#[tokio::test]
async fn failed_select_leaves_nothing_selected() {
    let (session, _server) = logged_in(|command| {
        if command == "SELECT Archive" {
            return "{tag} NO [NONEXISTENT] Unknown Mailbox\r\n".into();
        }
        standard_reply(command)
    })
    .await;

    assert!(session.select_mailbox("INBOX").await.unwrap());
    assert!(!session.select_mailbox("Archive").await.unwrap());
    assert_eq!(session.state().await, SessionStatus::Authenticated);

    let error = session.search_unseen().await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::UninitializedSession);
}

#[tokio::test]
async fn operations_check_the_session_state() {
    let session = MailSession::new(&test_account());
    assert_eq!(
        session.login("bot@example.com", "secret").await.unwrap_err().code(),
        ErrorCode::UninitializedSession
    );
    assert_eq!(
        session.select_mailbox("INBOX").await.unwrap_err().code(),
        ErrorCode::UninitializedSession
    );
    assert_eq!(
        session.list_mailboxes().await.unwrap_err().code(),
        ErrorCode::UninitializedSession
    );

    let (session, _server) = logged_in(standard_reply).await;
    assert_eq!(
        session.fetch_raw("1").await.unwrap_err().code(),
        ErrorCode::UninitializedSession
    );
    assert_eq!(
        session.login("bot@example.com", "secret").await.unwrap_err().code(),
        ErrorCode::UninitializedSession
    );
}

#[tokio::test]
async fn unseen_search_is_sorted_and_may_be_empty() {
    let searches = Arc::new(AtomicUsize::new(0));
    let counter = searches.clone();
    let (session, server) = logged_in(move |command| {
        if command == "UID SEARCH UNSEEN" && counter.fetch_add(1, Ordering::SeqCst) == 1 {
            return "* SEARCH 12 3 7\r\n{tag} OK SEARCH completed\r\n".into();
        }
        standard_reply(command)
    })
    .await;
    session.select_mailbox("INBOX").await.unwrap();

    assert!(session.search_unseen().await.unwrap().is_empty());
    assert_eq!(session.search_unseen().await.unwrap(), vec!["3", "7", "12"]);
    assert!(server
        .commands()
        .contains(&"UID SEARCH UNSEEN".to_string()));
}

#[tokio::test]
async fn message_id_search_returns_lowest_uid() {
    let (session, server) = logged_in(|command| {
        if command.starts_with("UID SEARCH HEADER") {
            return "* SEARCH 9 4\r\n{tag} OK SEARCH completed\r\n".into();
        }
        standard_reply(command)
    })
    .await;
    session.select_mailbox("INBOX").await.unwrap();

    let uid = session
        .search_by_message_id("<abc@example.com>")
        .await
        .unwrap();
    assert_eq!(uid.as_deref(), Some("4"));
    assert!(server
        .commands()
        .contains(&"UID SEARCH HEADER Message-ID \"<abc@example.com>\"".to_string()));
}

#[tokio::test]
async fn fetch_returns_raw_bytes_or_nothing() {
    let raw = "From: alice@example.com\r\nSubject: hi\r\n\r\nhello\r\n";
    let (session, server) = logged_in(move |command| {
        if command == "UID FETCH 7 RFC822" {
            return fetch_reply(7, raw);
        }
        standard_reply(command)
    })
    .await;
    session.select_mailbox("INBOX").await.unwrap();

    let body = session.fetch_raw("7").await.unwrap();
    assert_eq!(body.as_deref(), Some(raw.as_bytes()));
    assert_eq!(session.fetch_raw("8").await.unwrap(), None);
    assert!(server.commands().contains(&"UID FETCH 8 RFC822".to_string()));

    let error = session.fetch_raw("seven").await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::InvalidParameter);
}

#[tokio::test]
async fn list_keeps_only_sent_mailboxes() {
    let (session, server) = logged_in(standard_reply).await;
    assert_eq!(
        session.list_mailboxes().await.unwrap(),
        vec!["Sent Messages".to_string()]
    );
    assert!(server.commands().contains(&"LIST \"\" \"*\"".to_string()));
}

#[tokio::test]
async fn rejected_command_carries_server_text() {
    let (session, _server) = logged_in(|command| {
        if command == "UID SEARCH UNSEEN" {
            return "{tag} NO Mailbox is locked\r\n".into();
        }
        standard_reply(command)
    })
    .await;
    session.select_mailbox("INBOX").await.unwrap();

    let error = session.search_unseen().await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::ImapCommandFailed);
    match error.action_failure() {
        Some(ActionFailure::Imap { command, response }) => {
            assert_eq!(command, "UID SEARCH UNSEEN");
            assert!(response.contains("Mailbox is locked"));
        }
        other => panic!("unexpected failure {:?}", other),
    }
    assert_eq!(
        session.state().await,
        SessionStatus::Selected("INBOX".into())
    );
}

#[tokio::test]
async fn unanswered_command_times_out_and_disconnects() {
    let (session, _server) = logged_in(|command| {
        if command == "UID SEARCH UNSEEN" {
            return String::new();
        }
        standard_reply(command)
    })
    .await;
    session.select_mailbox("INBOX").await.unwrap();

    let error = session.search_unseen().await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::ConnectionTimeout);
    assert!(error.is_network());
    assert_eq!(session.state().await, SessionStatus::Disconnected);
}

#[tokio::test]
async fn disconnect_drops_the_session() {
    let (session, _server) = logged_in(standard_reply).await;
    session.disconnect().await;
    assert_eq!(session.state().await, SessionStatus::Disconnected);
    assert_eq!(
        session.logout().await.unwrap_err().code(),
        ErrorCode::UninitializedSession
    );
}

fn rejecting(verb: &'static str) -> impl FnMut(&str) -> String + Send + 'static {
    move |command: &str| {
        if command.starts_with(verb) {
            return "{tag} NO [UNAVAILABLE] Backend is down\r\n".into();
        }
        standard_reply(command)
    }
}

fn assert_rejected(error: &crate::modules::error::MailBridgeError, expected: &str) {
    assert_eq!(error.code(), ErrorCode::ImapCommandFailed);
    assert!(!error.is_network());
    match error.action_failure() {
        Some(ActionFailure::Imap { command, response }) => {
            assert_eq!(command, expected);
            assert!(response.contains("Backend is down"), "{response}");
        }
        other => panic!("unexpected failure {:?}", other),
    }
}

#[tokio::test]
async fn rejected_message_id_search_is_an_error() {
    let (session, _server) = logged_in(rejecting("UID SEARCH")).await;
    session.select_mailbox("INBOX").await.unwrap();
    let error = session.search_by_message_id("<a@b>").await.unwrap_err();
    assert_rejected(&error, "UID SEARCH HEADER Message-ID \"<a@b>\"");
}

#[tokio::test]
async fn rejected_fetch_is_not_a_missing_mail() {
    let (session, _server) = logged_in(rejecting("UID FETCH")).await;
    session.select_mailbox("INBOX").await.unwrap();
    let error = session.fetch_raw("7").await.unwrap_err();
    assert_rejected(&error, "UID FETCH 7 RFC822");
    assert_eq!(
        session.state().await,
        SessionStatus::Selected("INBOX".into())
    );
}

#[tokio::test]
async fn rejected_list_is_an_error() {
    let (session, _server) = logged_in(rejecting("LIST")).await;
    let error = session.list_mailboxes().await.unwrap_err();
    assert_rejected(&error, "LIST \"\" \"*\"");
    assert_eq!(session.state().await, SessionStatus::Authenticated);
}

#[tokio::test]
async fn bad_search_is_an_error() {
    let (session, _server) = logged_in(|command: &str| {
        if command.starts_with("UID SEARCH") {
            return "{tag} BAD Backend is down\r\n".into();
        }
        standard_reply(command)
    })
    .await;
    session.select_mailbox("INBOX").await.unwrap();
    let error = session.search_unseen().await.unwrap_err();
    assert_rejected(&error, "UID SEARCH UNSEEN");
}

#[tokio::test]
async fn untagged_data_before_completion_is_kept() {
    let (session, _server) = logged_in(|command: &str| {
        if command == "UID SEARCH UNSEEN" {
            return "* 3 EXISTS\r\n* SEARCH 9 4\r\n* SEARCH 12\r\n{tag} OK SEARCH completed\r\n"
                .into();
        }
        standard_reply(command)
    })
    .await;
    session.select_mailbox("INBOX").await.unwrap();
    assert_eq!(session.search_unseen().await.unwrap(), vec!["4", "9", "12"]);
}

#[tokio::test]
async fn closed_before_greeting_is_a_network_error() {
    let (client, server) = tokio::io::duplex(1024);
    drop(server);
    let session = MailSession::new(&test_account());
    let error = session
        .connect_with_stream(Box::new(client))
        .await
        .unwrap_err();
    assert!(error.is_network());
    assert_eq!(session.state().await, SessionStatus::Disconnected);
}
