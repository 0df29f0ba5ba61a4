// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use mail_parser::{HeaderName, MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::debug;

use crate::modules::message::{Attachment, Message, MessageSegment};
use crate::modules::model::{users_of, Mail, User};

/// Parses a raw RFC822 mail. Never fails: whatever cannot be extracted is
/// left empty.
pub fn parse(raw: &[u8]) -> Mail {
    let Some(message) = MessageParser::default().parse(raw) else {
        debug!("unparseable mail of {} bytes", raw.len());
        return Mail::default();
    };

    let raw_date = message.header_raw(HeaderName::Date).map(uncommented);
    let (date, timezone) = match message.date().filter(|date| date.is_valid()) {
        Some(date) => {
            let utc = DateTime::<Utc>::from_timestamp(date.to_timestamp(), 0);
            let offset = raw_date.as_deref().is_some_and(names_zone).then(|| {
                let hours = date.tz_hour as f32 + date.tz_minute as f32 / 60.0;
                if date.tz_before_gmt {
                    -hours
                } else {
                    hours
                }
            });
            (utc, offset)
        }
        None => (raw_date.as_deref().and_then(zoneless_instant), None),
    };

    let texts = message.text_body.iter().filter_map(|id| {
        match &message.part(*id)?.body {
            PartType::Text(text) => Some(MessageSegment::text(text.as_ref())),
            _ => None,
        }
    });
    let htmls = message.html_body.iter().filter_map(|id| {
        match &message.part(*id)?.body {
            PartType::Html(html) => Some(MessageSegment::html(html.as_ref())),
            _ => None,
        }
    });
    let attachments: Vec<MessageSegment> = message
        .attachments
        .iter()
        .enumerate()
        .filter_map(|(index, id)| message.part(*id).map(|part| attachment_of(index, part)))
        .map(MessageSegment::Attachment)
        .collect();

    let plain: Message = texts.chain(attachments.iter().cloned()).collect();
    let original: Message = htmls.chain(attachments).collect();

    Mail {
        id: header_text(&message, HeaderName::MessageId).unwrap_or_default(),
        sender: users_of(message.from())
            .into_iter()
            .next()
            .unwrap_or_else(User::default),
        recipients_to: users_of(message.to()),
        recipients_cc: users_of(message.cc()),
        recipients_bcc: users_of(message.bcc()),
        subject: message.subject().unwrap_or_default().to_string(),
        date,
        timezone,
        message: plain,
        original_message: original,
        in_reply_to: header_text(&message, HeaderName::InReplyTo),
    }
}

/// Date header text with `(comments)` removed and whitespace collapsed.
fn uncommented(raw: &str) -> String {
    let mut depth = 0usize;
    let kept: String = raw
        .chars()
        .filter(|ch| match ch {
            '(' => {
                depth += 1;
                false
            }
            ')' => {
                depth = depth.saturating_sub(1);
                false
            }
            _ => depth == 0,
        })
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether something follows the time of day. A missing zone reads as
/// +0000 once parsed, so only the header text can tell them apart.
fn names_zone(date: &str) -> bool {
    date.split_whitespace()
        .skip_while(|token| !token.contains(':'))
        .nth(1)
        .is_some()
}

/// A date with no zone at all, read as UTC.
fn zoneless_instant(date: &str) -> Option<DateTime<Utc>> {
    let date = match date.split_once(',') {
        Some((_weekday, rest)) => rest.trim(),
        None => date,
    };
    ["%d %b %Y %H:%M:%S", "%d %b %Y %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(date, format).ok())
        .map(|naive| naive.and_utc())
}

/// Header value as sent, minus surrounding whitespace.
fn header_text<'x>(message: &mail_parser::Message<'x>, name: HeaderName<'x>) -> Option<String> {
    message
        .header_raw(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn attachment_of(index: usize, part: &MessagePart<'_>) -> Attachment {
    let name = part
        .attachment_name()
        .map(String::from)
        .unwrap_or_else(|| format!("attachment-{}", index + 1));
    let content_type = part.content_type().map(|ct| match ct.subtype() {
        Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
        None => ct.ctype().to_string(),
    });
    let data: Arc<[u8]> = Arc::from(part.contents());
    Attachment {
        name,
        content_type,
        data,
    }
}
