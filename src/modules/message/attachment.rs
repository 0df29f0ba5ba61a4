// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailBridgeResult;
use crate::{base64_decode, base64_encode, raise_error};

/// A file carried by a mail. The bytes are shared between every
/// [`Message`](crate::modules::message::Message) that holds the attachment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    /// MIME type, e.g. `image/png`. `None` lets the composer guess from the name.
    pub content_type: Option<String>,
    pub data: Arc<[u8]>,
}

/// Wire shape used by bot frameworks to pass attachments around.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedAttachment {
    pub name: String,
    /// `content` is base64 when true, the literal text otherwise
    pub binary: bool,
    pub content: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, content_type: Option<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            content_type,
            data: data.into(),
        }
    }

    pub fn from_encoded(encoded: EncodedAttachment) -> MailBridgeResult<Self> {
        let data: Arc<[u8]> = if encoded.binary {
            base64_decode!(encoded.content.trim())
                .map_err(|e| {
                    raise_error!(
                        format!("attachment '{}' is not valid base64: {}", encoded.name, e),
                        ErrorCode::InvalidParameter
                    )
                })?
                .into()
        } else {
            encoded.content.into_bytes().into()
        };
        Ok(Self {
            name: encoded.name,
            content_type: encoded.content_type,
            data,
        })
    }

    pub fn encoded(&self) -> EncodedAttachment {
        EncodedAttachment {
            name: self.name.clone(),
            binary: true,
            content: base64_encode!(&self.data),
            content_type: self.content_type.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[attachment:{}, {}, {} bytes]",
            self.name,
            self.content_type.as_deref().unwrap_or("unknown"),
            self.data.len()
        )
    }
}
