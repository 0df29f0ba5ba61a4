// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite, BufWriter, DuplexStream};
use tokio_io_timeout::TimeoutStream;

/// Byte pipe an IMAP connection runs over.
pub trait SessionStream: AsyncRead + AsyncWrite + Unpin + Send + Sync + std::fmt::Debug {}

impl SessionStream for Box<dyn SessionStream> {}

impl<T: SessionStream> SessionStream for tokio_rustls::client::TlsStream<T> {}

impl<T: SessionStream> SessionStream for BufWriter<T> {}

impl<T: AsyncRead + AsyncWrite + Send + Sync + std::fmt::Debug> SessionStream
    for Pin<Box<TimeoutStream<T>>>
{
}

// In-process transports, e.g. a scripted server on the other end.
impl SessionStream for DuplexStream {}
