// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;

use crate::modules::error::code::ErrorCode;
use crate::modules::error::{ActionFailure, MailBridgeError, MailBridgeResult, SmtpReply};
use crate::modules::mime::OutboundDocument;
use crate::{action_failed, raise_error};
use mail_send::smtp::message::Parameters;
use mail_send::SmtpClient;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::{debug, warn};

/// An authenticated SMTP connection, ready for one transaction.
pub enum SmtpConnection {
    Plain(SmtpClient<TcpStream>),
    Tls(SmtpClient<TlsStream<TcpStream>>),
}

impl SmtpConnection {
    /// Runs the transaction and closes the connection.
    pub async fn deliver(self, document: &OutboundDocument, account: &str) -> MailBridgeResult<()> {
        match self {
            SmtpConnection::Plain(client) => deliver(client, document, account).await,
            SmtpConnection::Tls(client) => deliver(client, document, account).await,
        }
    }
}

pub(crate) async fn deliver<T>(
    mut client: SmtpClient<T>,
    document: &OutboundDocument,
    account: &str,
) -> MailBridgeResult<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let result = submit(&mut client, document, account).await;
    if let Err(e) = client.quit().await {
        debug!("SMTP QUIT for {account} failed: {e}");
    }
    result
}

/// `MAIL FROM`, one `RCPT TO` per recipient, then `DATA` unless every
/// recipient was refused.
pub(crate) async fn submit<T>(
    client: &mut SmtpClient<T>,
    document: &OutboundDocument,
    account: &str,
) -> MailBridgeResult<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let params = Parameters::new();
    client
        .mail_from(&document.from, &params)
        .await
        .map_err(|e| classify(e, account))?;

    let mut refused = BTreeMap::new();
    for recipient in &document.recipients {
        match client.rcpt_to(recipient, &params).await {
            Ok(()) => {}
            Err(mail_send::Error::UnexpectedReply(reply)) => {
                warn!(
                    "SMTP server refused recipient {recipient}: {} {}",
                    reply.code, reply.message
                );
                refused.insert(
                    recipient.clone(),
                    SmtpReply {
                        code: reply.code,
                        message: reply.message,
                    },
                );
            }
            Err(e) => return Err(classify(e, account)),
        }
    }

    if refused.len() == document.recipients.len() {
        if let Err(e) = client.rset().await {
            debug!("SMTP RSET for {account} failed: {e}");
        }
        return Err(action_failed!(ActionFailure::Smtp(refused)));
    }

    client
        .data(&document.body)
        .await
        .map_err(|e| classify(e, account))?;

    if refused.is_empty() {
        Ok(())
    } else {
        Err(action_failed!(ActionFailure::Smtp(refused)))
    }
}

/// Negative replies are keyed by the sending account; transport trouble is a
/// network error.
pub(crate) fn classify(error: mail_send::Error, account: &str) -> MailBridgeError {
    match error {
        mail_send::Error::UnexpectedReply(reply) | mail_send::Error::AuthenticationFailed(reply) => {
            let mut replies = BTreeMap::new();
            replies.insert(
                account.to_string(),
                SmtpReply {
                    code: reply.code,
                    message: reply.message,
                },
            );
            action_failed!(ActionFailure::Smtp(replies))
        }
        e @ (mail_send::Error::Io(_)
        | mail_send::Error::Tls(_)
        | mail_send::Error::InvalidTLSName
        | mail_send::Error::Timeout
        | mail_send::Error::MissingStartTls
        | mail_send::Error::UnparseableReply) => {
            raise_error!(format!("SMTP transport failure: {}", e), ErrorCode::NetworkError)
        }
        other => raise_error!(
            format!("SMTP command failed: {}", other),
            ErrorCode::SmtpCommandFailed
        ),
    }
}
