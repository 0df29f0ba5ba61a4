// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::account::entity::{Encryption, MailAccount};
use crate::modules::error::MailBridgeResult;
use crate::modules::smtp::client::{classify, SmtpConnection};
use mail_send::smtp::AssertReply;
use mail_send::{Credentials, SmtpClient, SmtpClientBuilder};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

pub struct SmtpClientManager<'a> {
    account: &'a MailAccount,
}

impl<'a> SmtpClientManager<'a> {
    pub fn new(account: &'a MailAccount) -> Self {
        Self { account }
    }

    fn credentials(&self) -> Credentials<String> {
        Credentials::new(self.account.address.clone(), self.account.secret.clone())
    }

    /// Connects according to the account's SMTP settings and authenticates.
    pub async fn build(&self) -> MailBridgeResult<SmtpConnection> {
        let smtp = &self.account.smtp;
        let address = self.account.address.as_str();
        debug!(
            "Bot <{address}>: connecting to SMTP {}:{} ({:?})",
            smtp.host, smtp.port, smtp.encryption
        );

        let builder = SmtpClientBuilder::new(smtp.host.clone(), smtp.port)
            .credentials(self.credentials())
            .timeout(self.account.timeout());

        let client = match smtp.encryption {
            Encryption::Ssl => {
                let client = builder
                    .implicit_tls(true)
                    .connect()
                    .await
                    .map_err(|e| classify(e, address))?;
                SmtpConnection::Tls(client)
            }
            Encryption::StartTls => {
                let client = builder
                    .implicit_tls(false)
                    .connect()
                    .await
                    .map_err(|e| classify(e, address))?;
                SmtpConnection::Tls(client)
            }
            Encryption::None => {
                let client = builder
                    .connect_plain()
                    .await
                    .map_err(|e| classify(e, address))?;
                SmtpConnection::Plain(client)
            }
        };

        Ok(client)
    }

    /// Greeting, EHLO and AUTH over an already open, unencrypted stream.
    pub async fn handshake<T>(&self, stream: T) -> MailBridgeResult<SmtpClient<T>>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let timeout = self.account.timeout();
        let address = self.account.address.as_str();
        handshake(stream, timeout, &self.credentials())
            .await
            .map_err(|e| classify(e, address))
    }
}

async fn handshake<T>(
    stream: T,
    timeout: Duration,
    credentials: &Credentials<String>,
) -> Result<SmtpClient<T>, mail_send::Error>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(timeout, async {
        let mut client = SmtpClient { stream, timeout };
        let local_host = gethostname::gethostname()
            .to_str()
            .unwrap_or("[127.0.0.1]")
            .to_string();
        client.read().await?.assert_positive_completion()?;
        let capabilities = client.capabilities(&local_host, false).await?;
        client.authenticate(credentials, &capabilities).await?;
        Ok(client)
    })
    .await
    .map_err(|_| mail_send::Error::Timeout)?
}
