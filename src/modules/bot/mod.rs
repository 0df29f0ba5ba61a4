// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use tracing::{debug, error, info, warn};

use crate::modules::account::entity::MailAccount;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailBridgeResult;
use crate::modules::event::{Event, EventHandler, NewMailMessageEvent};
use crate::modules::imap::{MailSession, INBOX};
use crate::modules::message::Message;
use crate::modules::mime::{parse, MailComposer, OutboundDocument, OutgoingMail};
use crate::modules::model::Mail;
use crate::modules::smtp::MailSender;
use crate::raise_error;


/// One mail account seen as a bot: an IMAP session for reading, a composer
/// and sender for writing.
#[derive(Clone, Debug)]
pub struct MailBot {
    account: MailAccount,
    session: MailSession,
    composer: MailComposer,
    sender: MailSender,
}

impl MailBot {
    pub fn new(account: MailAccount) -> Self {
        let session = MailSession::new(&account);
        let composer = MailComposer::new(&account);
        let sender = MailSender::new(&account);
        Self {
            account,
            session,
            composer,
            sender,
        }
    }

    pub fn account(&self) -> &MailAccount {
        &self.account
    }

    pub fn session(&self) -> &MailSession {
        &self.session
    }

    /// Connects and logs in, treating a rejected login as an error.
    pub async fn connect(&self) -> MailBridgeResult<()> {
        self.session.connect().await?;
        self.login().await
    }

    pub async fn login(&self) -> MailBridgeResult<()> {
        if self
            .session
            .login(&self.account.address, &self.account.secret)
            .await?
        {
            return Ok(());
        }
        Err(raise_error!(
            format!("Bot <{}>: IMAP login was rejected", self.account.address),
            ErrorCode::ImapAuthenticationFailed
        ))
    }

    pub async fn logout(&self) -> MailBridgeResult<bool> {
        self.session.logout().await
    }

    /// Fetches and parses the mail stored under `uid` in the selected mailbox.
    pub async fn get_mail_of_uid(&self, uid: &str) -> MailBridgeResult<Option<Mail>> {
        let raw = self.session.fetch_raw(uid).await?;
        Ok(raw.map(|bytes| parse(&bytes)))
    }

    /// Looks for `message_id` in one mailbox, leaving that mailbox selected.
    pub async fn get_mail_of_id_in_mailbox(
        &self,
        message_id: &str,
        mailbox: &str,
    ) -> MailBridgeResult<Option<Mail>> {
        if !self.session.select_mailbox(mailbox).await? {
            debug!(
                "Bot <{}>: cannot select {mailbox} while looking for {message_id}",
                self.account.address
            );
            return Ok(None);
        }
        match self.session.search_by_message_id(message_id).await? {
            Some(uid) => self.get_mail_of_uid(&uid).await,
            None => Ok(None),
        }
    }

    /// Resolves a Message-ID across INBOX and every Sent mailbox. INBOX is
    /// selected again afterwards whatever the outcome.
    pub async fn get_mail_of_id(&self, message_id: &str) -> MailBridgeResult<Option<Mail>> {
        let found = self.search_everywhere(message_id).await;
        let restored = self.session.select_mailbox(INBOX).await;
        let mail = found?;
        if !restored? {
            warn!("Bot <{}>: failed to reselect {INBOX}", self.account.address);
        }
        Ok(mail)
    }

    async fn search_everywhere(&self, message_id: &str) -> MailBridgeResult<Option<Mail>> {
        if let Some(mail) = self.get_mail_of_id_in_mailbox(message_id, INBOX).await? {
            return Ok(Some(mail));
        }
        for mailbox in self.session.list_mailboxes().await? {
            if let Some(mail) = self.get_mail_of_id_in_mailbox(message_id, &mailbox).await? {
                return Ok(Some(mail));
            }
        }
        Ok(None)
    }

    /// Turns every unseen mail in INBOX into an event. Mails that vanish
    /// between search and fetch are skipped.
    pub async fn fetch_unseen_events(&self) -> MailBridgeResult<Vec<Event>> {
        if !self.session.select_mailbox(INBOX).await? {
            return Err(raise_error!(
                format!("Bot <{}>: cannot select {INBOX}", self.account.address),
                ErrorCode::ImapCommandFailed
            ));
        }
        let uids = self.session.search_unseen().await?;
        let mut events = Vec::with_capacity(uids.len());
        for uid in uids {
            match self.get_mail_of_uid(&uid).await? {
                Some(mail) => events.push(Event::NewMail(NewMailMessageEvent::new(mail))),
                None => debug!("Bot <{}>: UID {uid} returned no body", self.account.address),
            }
        }
        if !events.is_empty() {
            info!(
                "Bot <{}>: {} new mail(s) in {INBOX}",
                self.account.address,
                events.len()
            );
        }
        Ok(events)
    }

    pub fn check_to_me(&self, event: &mut NewMailMessageEvent) {
        if event.mail.is_addressed_to(&self.account.address) {
            event.to_me = true;
        }
    }

    /// Fills `reply` from `In-Reply-To`. Failures are logged, never returned.
    pub async fn check_reply(&self, event: &mut NewMailMessageEvent) {
        let Some(in_reply_to) = event.mail.in_reply_to.clone() else {
            return;
        };
        match self.get_mail_of_id(&in_reply_to).await {
            Ok(reply) => {
                if reply
                    .as_ref()
                    .is_some_and(|reply| reply.sender.id == self.account.address)
                {
                    event.to_me = true;
                }
                event.reply = reply;
            }
            Err(e) if e.code() == ErrorCode::UninitializedSession => {
                error!(
                    "Bot <{}>: failed to fetch the reply mail {in_reply_to}: {e:?}",
                    self.account.address
                );
            }
            Err(e) => {
                warn!(
                    "Bot <{}>: failed to fetch the reply mail {in_reply_to}: {e:?}",
                    self.account.address
                );
            }
        }
    }

    pub async fn correlate(&self, event: &mut Event) {
        match event {
            Event::NewMail(event) => {
                self.check_to_me(event);
                self.check_reply(event).await;
            }
        }
    }

    /// Correlates the event, then hands it to `handler`.
    pub async fn handle_event<H: EventHandler>(&self, mut event: Event, handler: &H) {
        self.correlate(&mut event).await;
        handler.handle_event(self, &event).await;
    }

    /// Replies to the sender of `event`.
    pub async fn send(
        &self,
        event: &Event,
        message: impl Into<Message>,
        subject: Option<&str>,
        in_reply_to: Option<&str>,
    ) -> MailBridgeResult<()> {
        let recipient = event.user_id().to_string();
        self.send_to(&[recipient], message, subject, in_reply_to)
            .await
    }

    pub async fn send_to(
        &self,
        recipients: &[String],
        message: impl Into<Message>,
        subject: Option<&str>,
        in_reply_to: Option<&str>,
    ) -> MailBridgeResult<()> {
        let document = self
            .composer
            .compose(&message.into(), recipients, subject, in_reply_to)?;
        self.sender.send(&document).await
    }

    pub async fn send_mail(&self, mail: OutgoingMail) -> MailBridgeResult<()> {
        let document = match mail {
            OutgoingMail::Message {
                message,
                recipients,
                subject,
                in_reply_to,
            } => self.composer.compose(
                &message,
                &recipients,
                subject.as_deref(),
                in_reply_to.as_deref(),
            )?,
            OutgoingMail::Document(document) => document,
        };
        self.send_document(&document).await
    }

    pub async fn send_document(&self, document: &OutboundDocument) -> MailBridgeResult<()> {
        self.sender.send(document).await
    }
}
