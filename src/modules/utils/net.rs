// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailBridgeResult;
use crate::modules::imap::session::SessionStream;
use crate::raise_error;
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_io_timeout::TimeoutStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

pub(crate) type TimedTcpStream = Pin<Box<TimeoutStream<TcpStream>>>;

/// TCP connection whose connect, read and write steps all give up after
/// `io_timeout`.
pub(crate) async fn connect_tcp(
    address: SocketAddr,
    io_timeout: Duration,
) -> MailBridgeResult<TimedTcpStream> {
    let tcp_stream = match tokio::time::timeout(io_timeout, TcpStream::connect(address)).await {
        Ok(connected) => connected.map_err(|e| {
            raise_error!(
                format!("cannot connect to {}: {}", address, e),
                ErrorCode::NetworkError
            )
        })?,
        Err(_) => {
            warn!("TCP connect to {address} gave up after {io_timeout:?}");
            return Err(raise_error!(
                format!("TCP connect to {} timed out", address),
                ErrorCode::ConnectionTimeout
            ));
        }
    };
    tcp_stream
        .set_nodelay(true)
        .map_err(|e| raise_error!(e.to_string(), ErrorCode::NetworkError))?;

    let mut timed = TimeoutStream::new(tcp_stream);
    timed.set_read_timeout(Some(io_timeout));
    timed.set_write_timeout(Some(io_timeout));
    Ok(Box::pin(timed))
}

/// Client config trusting the webpki roots, offering `alpn` when non-empty.
fn client_config(alpn: &[&str]) -> ClientConfig {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.into(),
    };
    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = alpn.iter().map(|p| p.as_bytes().to_vec()).collect();
    config
}

/// Runs the TLS handshake for `host` over an already open stream.
pub(crate) async fn upgrade_to_tls<S>(
    host: &str,
    alpn: &[&str],
    stream: S,
) -> MailBridgeResult<TlsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let server_name = ServerName::try_from(host)
        .map_err(|_| {
            raise_error!(
                format!("'{}' is not a valid TLS server name", host),
                ErrorCode::InvalidParameter
            )
        })?
        .to_owned();
    let stream = TlsConnector::from(Arc::new(client_config(alpn)))
        .connect(server_name, stream)
        .await
        .map_err(|e| {
            raise_error!(
                format!("TLS handshake with {} failed: {}", host, e),
                ErrorCode::NetworkError
            )
        })?;
    debug!("TLS established with {host}");
    Ok(stream)
}

/// TCP connect followed by the TLS handshake, as used for implicit TLS.
pub(crate) async fn connect_tls(
    address: SocketAddr,
    host: &str,
    alpn: &[&str],
    io_timeout: Duration,
) -> MailBridgeResult<impl SessionStream> {
    let tcp_stream = connect_tcp(address, io_timeout).await?;
    upgrade_to_tls(host, alpn, tcp_stream).await
}
