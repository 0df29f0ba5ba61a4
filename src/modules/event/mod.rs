// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::modules::bot::MailBot;
use crate::modules::message::Message;
use crate::modules::model::{Mail, User};
use crate::utc_now;

#[derive(Clone, Copy, Debug, Hash, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum EventType {
    /// A mail that was unseen when the bot polled INBOX.
    #[default]
    NewMailMessage,
}

impl EventType {
    pub fn name(&self) -> &'static str {
        match self {
            EventType::NewMailMessage => "new_mail_message",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A newly received mail together with what the bot learned about it.
///
/// `to_me` and `reply` start out empty and are filled in once by
/// [`MailBot::handle_event`] before the event reaches a handler.
#[derive(Clone, Debug)]
pub struct NewMailMessageEvent {
    pub mail: Mail,
    pub to_me: bool,
    pub reply: Option<Mail>,
    /// Milliseconds since the epoch at which the bot built the event.
    pub timestamp: i64,
}

impl NewMailMessageEvent {
    pub fn new(mail: Mail) -> Self {
        Self {
            mail,
            to_me: false,
            reply: None,
            timestamp: utc_now!(),
        }
    }

    pub fn id(&self) -> &str {
        &self.mail.id
    }

    pub fn sender(&self) -> &User {
        &self.mail.sender
    }

    pub fn recipients_to(&self) -> &[User] {
        &self.mail.recipients_to
    }

    pub fn in_reply_to(&self) -> Option<&str> {
        self.mail.in_reply_to.as_deref()
    }

    pub fn subject(&self) -> &str {
        &self.mail.subject
    }

    pub fn get_message(&self) -> &Message {
        &self.mail.message
    }

    pub fn is_tome(&self) -> bool {
        self.to_me
    }

    pub fn user_id(&self) -> &str {
        &self.mail.sender.id
    }

    /// Conversations are keyed by the sender; there is no thread notion.
    pub fn session_id(&self) -> &str {
        self.user_id()
    }

    pub fn description(&self) -> String {
        format!(
            "Message {} from {}<{}>: {}",
            self.mail.id, self.mail.sender.name, self.mail.sender.id, self.mail.message
        )
    }
}

#[derive(Clone, Debug)]
pub enum Event {
    NewMail(NewMailMessageEvent),
}

impl Event {
    pub fn kind(&self) -> EventType {
        match self {
            Event::NewMail(_) => EventType::NewMailMessage,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Event::NewMail(_) => "message",
        }
    }

    pub fn event_name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn user_id(&self) -> &str {
        match self {
            Event::NewMail(event) => event.user_id(),
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Event::NewMail(event) => event.session_id(),
        }
    }

    pub fn get_message(&self) -> &Message {
        match self {
            Event::NewMail(event) => event.get_message(),
        }
    }

    pub fn is_tome(&self) -> bool {
        match self {
            Event::NewMail(event) => event.is_tome(),
        }
    }

    pub fn description(&self) -> String {
        match self {
            Event::NewMail(event) => event.description(),
        }
    }
}

impl From<NewMailMessageEvent> for Event {
    fn from(event: NewMailMessageEvent) -> Self {
        Event::NewMail(event)
    }
}

/// Receives events once correlation is done.
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, bot: &MailBot, event: &Event) -> impl Future<Output = ()> + Send;
}

#[cfg(test)]
mod test {
    use super::*;

    fn mail() -> Mail {
        Mail {
            id: "<m1@example.com>".into(),
            sender: User::new("alice@example.com", "Alice"),
            recipients_to: vec![User::new("bot@example.com", "")],
            message: Message::from("hello"),
            in_reply_to: Some("<m0@example.com>".into()),
            ..Default::default()
        }
    }

    #[test]
    fn new_event_is_not_correlated() {
        let event = NewMailMessageEvent::new(mail());
        assert!(!event.is_tome());
        assert!(event.reply.is_none());
        assert!(event.timestamp > 0);
    }

    #[test]
    fn accessors_follow_the_mail() {
        let event = NewMailMessageEvent::new(mail());
        assert_eq!(event.sender().id, "alice@example.com");
        assert_eq!(event.user_id(), "alice@example.com");
        assert_eq!(event.session_id(), "alice@example.com");
        assert_eq!(event.in_reply_to(), Some("<m0@example.com>"));
        assert_eq!(event.recipients_to().len(), 1);
        assert_eq!(event.get_message().extract_plain_text(), "hello");
    }

    #[test]
    fn description_names_sender_and_text() {
        let event = Event::from(NewMailMessageEvent::new(mail()));
        assert_eq!(
            event.description(),
            "Message <m1@example.com> from Alice<alice@example.com>: hello"
        );
        assert_eq!(event.event_type(), "message");
        assert_eq!(event.event_name(), "new_mail_message");
        assert_eq!(event.kind(), EventType::NewMailMessage);
    }
}
