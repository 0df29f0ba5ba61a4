// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::{
    modules::error::{code::ErrorCode, MailBridgeResult},
    raise_error,
};

/// Installs ring as the process-wide rustls provider. Call once, before the
/// first TLS handshake.
pub fn install_crypto_provider() -> MailBridgeResult<()> {
    rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .map_err(|_| {
            raise_error!(
                "failed to set crypto provider".into(),
                ErrorCode::InternalError
            )
        })
}
