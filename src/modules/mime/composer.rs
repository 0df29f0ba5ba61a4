// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::borrow::Cow;

use mail_send::mail_builder::mime::{BodyPart, MimePart};
use mail_send::mail_builder::MessageBuilder;
use tracing::trace;

use crate::modules::account::entity::MailAccount;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailBridgeResult;
use crate::modules::message::{Attachment, Message, MessageSegment};
use crate::modules::utils::generate_message_id;
use crate::{raise_error, utc_now};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// A fully rendered mail plus its SMTP envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundDocument {
    /// Envelope sender (`MAIL FROM`)
    pub from: String,
    /// Envelope recipients (`RCPT TO`), in order
    pub recipients: Vec<String>,
    /// RFC822 bytes handed to `DATA`
    pub body: Vec<u8>,
}

/// What [`MailBot::send_mail`](crate::modules::bot::MailBot::send_mail) accepts.
#[derive(Clone, Debug)]
pub enum OutgoingMail {
    Message {
        message: Message,
        recipients: Vec<String>,
        subject: Option<String>,
        in_reply_to: Option<String>,
    },
    /// Sent as-is, composition is skipped.
    Document(OutboundDocument),
}

/// Renders [`Message`]s as `multipart/mixed` mails from one account.
#[derive(Clone, Debug)]
pub struct MailComposer {
    from: String,
    default_subject: String,
}

impl MailComposer {
    pub fn new(account: &MailAccount) -> Self {
        Self {
            from: account.address.clone(),
            default_subject: account.subject.clone(),
        }
    }

    pub fn compose(
        &self,
        message: &Message,
        recipients: &[String],
        subject: Option<&str>,
        in_reply_to: Option<&str>,
    ) -> MailBridgeResult<OutboundDocument> {
        if recipients.is_empty() {
            return Err(raise_error!(
                "a mail needs at least one recipient".into(),
                ErrorCode::InvalidParameter
            ));
        }

        let mut parts: Vec<MimePart<'static>> = message.iter().map(mime_part_of).collect();
        if parts.is_empty() {
            parts.push(MimePart::new("text/plain", ""));
        }

        let subject = subject
            .filter(|subject| !subject.is_empty())
            .unwrap_or(&self.default_subject)
            .to_string();

        let mut builder = MessageBuilder::new()
            .from(self.from.clone())
            .to(recipients.to_vec())
            .subject(subject)
            .message_id(generate_message_id(&self.from))
            .date(utc_now!() / 1000);
        if let Some(reference) = in_reply_to.map(strip_angle_brackets) {
            builder = builder.in_reply_to(reference.to_string());
        }

        let body = builder
            .body(MimePart::new("multipart/mixed", parts))
            .write_to_vec()
            .map_err(|e| {
                raise_error!(
                    format!("failed to render outgoing mail: {}", e),
                    ErrorCode::InternalError
                )
            })?;
        trace!("composed a {} byte mail for {:?}", body.len(), recipients);

        Ok(OutboundDocument {
            from: self.from.clone(),
            recipients: recipients.to_vec(),
            body,
        })
    }
}

/// mail-builder adds the brackets itself.
fn strip_angle_brackets(id: &str) -> &str {
    let id = id.trim();
    id.strip_prefix('<')
        .and_then(|inner| inner.strip_suffix('>'))
        .unwrap_or(id)
}

fn mime_part_of(segment: &MessageSegment) -> MimePart<'static> {
    match segment {
        MessageSegment::Text { text } => MimePart::new("text/plain", text.clone()),
        MessageSegment::Html { html } => MimePart::new("text/html", html.clone()),
        MessageSegment::Attachment(attachment) => MimePart::new(
            content_type_of(attachment),
            BodyPart::Binary(Cow::Owned(attachment.data.to_vec())),
        )
        .attachment(attachment.name.clone()),
    }
}

fn content_type_of(attachment: &Attachment) -> String {
    match &attachment.content_type {
        Some(content_type) if !content_type.is_empty() => content_type.clone(),
        _ => mime_guess::from_path(&attachment.name)
            .first()
            .map(|mime| mime.to_string())
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string()),
    }
}
