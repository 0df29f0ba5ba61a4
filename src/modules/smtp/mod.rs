// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::account::entity::MailAccount;
use crate::modules::error::MailBridgeResult;
use crate::modules::mime::OutboundDocument;
use crate::modules::smtp::client::deliver;
use crate::modules::smtp::manager::SmtpClientManager;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

pub mod client;
pub mod manager;
#[cfg(test)]
mod tests;

/// Submits documents for one account. Every call uses a fresh connection,
/// so calls may run concurrently.
#[derive(Clone, Debug)]
pub struct MailSender {
    account: MailAccount,
}

impl MailSender {
    pub fn new(account: &MailAccount) -> Self {
        Self {
            account: account.clone(),
        }
    }

    pub async fn send(&self, document: &OutboundDocument) -> MailBridgeResult<()> {
        let connection = SmtpClientManager::new(&self.account).build().await?;
        connection.deliver(document, &self.account.address).await?;
        self.delivered(document);
        Ok(())
    }

    /// Same as [`MailSender::send`] over a caller-supplied plain stream.
    pub async fn send_over<T>(&self, stream: T, document: &OutboundDocument) -> MailBridgeResult<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let client = SmtpClientManager::new(&self.account)
            .handshake(stream)
            .await?;
        deliver(client, document, &self.account.address).await?;
        self.delivered(document);
        Ok(())
    }

    fn delivered(&self, document: &OutboundDocument) {
        info!(
            "Bot <{}>: mail of {} bytes delivered to {:?}",
            self.account.address,
            document.body.len(),
            document.recipients
        );
    }
}
