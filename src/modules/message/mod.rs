// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;
use std::ops::{Add, AddAssign};

pub mod attachment;

pub use attachment::{Attachment, EncodedAttachment};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageSegment {
    Text { text: String },
    Html { html: String },
    Attachment(Attachment),
}

impl MessageSegment {
    pub fn text(text: impl Into<String>) -> Self {
        MessageSegment::Text { text: text.into() }
    }

    pub fn html(html: impl Into<String>) -> Self {
        MessageSegment::Html { html: html.into() }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, MessageSegment::Text { .. })
    }
}

impl fmt::Display for MessageSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageSegment::Text { text } => f.write_str(text),
            MessageSegment::Html { html } => write!(f, "[html:{}]", html),
            MessageSegment::Attachment(attachment) => fmt::Display::fmt(attachment, f),
        }
    }
}

impl From<Attachment> for MessageSegment {
    fn from(attachment: Attachment) -> Self {
        MessageSegment::Attachment(attachment)
    }
}

/// Ordered list of segments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message(Vec<MessageSegment>);

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[MessageSegment] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MessageSegment> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, segment: MessageSegment) {
        self.0.push(segment);
    }

    /// Text of the `Text` segments, concatenated.
    pub fn extract_plain_text(&self) -> String {
        self.0
            .iter()
            .filter_map(|segment| match segment {
                MessageSegment::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.0.iter().filter_map(|segment| match segment {
            MessageSegment::Attachment(attachment) => Some(attachment),
            _ => None,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            match segment {
                MessageSegment::Attachment(attachment) => {
                    write!(f, "[attachment:{}]", attachment.name)?
                }
                other => fmt::Display::fmt(other, f)?,
            }
        }
        Ok(())
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::new() + text
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::from(text.as_str())
    }
}

impl From<MessageSegment> for Message {
    fn from(segment: MessageSegment) -> Self {
        Message(vec![segment])
    }
}

impl From<Vec<MessageSegment>> for Message {
    fn from(segments: Vec<MessageSegment>) -> Self {
        Message(segments)
    }
}

impl FromIterator<MessageSegment> for Message {
    fn from_iter<I: IntoIterator<Item = MessageSegment>>(iter: I) -> Self {
        Message(iter.into_iter().collect())
    }
}

impl IntoIterator for Message {
    type Item = MessageSegment;
    type IntoIter = std::vec::IntoIter<MessageSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Message {
    type Item = &'a MessageSegment;
    type IntoIter = std::slice::Iter<'a, MessageSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl AddAssign<Message> for Message {
    fn add_assign(&mut self, rhs: Message) {
        self.0.extend(rhs.0);
    }
}

impl AddAssign<MessageSegment> for Message {
    fn add_assign(&mut self, rhs: MessageSegment) {
        self.0.push(rhs);
    }
}

impl AddAssign<&str> for Message {
    fn add_assign(&mut self, rhs: &str) {
        if !rhs.is_empty() {
            self.0.push(MessageSegment::text(rhs));
        }
    }
}

impl<T> Add<T> for Message
where
    Message: AddAssign<T>,
{
    type Output = Message;

    fn add(mut self, rhs: T) -> Message {
        self += rhs;
        self
    }
}

impl<T> Add<T> for MessageSegment
where
    Message: AddAssign<T>,
{
    type Output = Message;

    fn add(self, rhs: T) -> Message {
        Message::from(self) + rhs
    }
}

impl Add<MessageSegment> for &str {
    type Output = Message;

    fn add(self, rhs: MessageSegment) -> Message {
        Message::from(self) + rhs
    }
}

impl Add<Message> for &str {
    type Output = Message;

    fn add(self, rhs: Message) -> Message {
        Message::from(self) + rhs
    }
}
