// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::account::entity::{Encryption, ServerConfig};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailBridgeResult;
use crate::modules::imap::session::SessionStream;
use crate::modules::utils::net::{connect_tcp, connect_tls, upgrade_to_tls};
use crate::raise_error;
use async_imap::Client as ImapClient;
use async_imap::Session as ImapSession;
use std::net::SocketAddr;
use std::net::ToSocketAddrs;
use std::time::Duration;
use tokio::io::BufWriter;
use tracing::debug;

/// An IMAP connection that has received its greeting but is not logged in yet.
#[derive(Debug)]
pub(crate) struct Client {
    inner: ImapClient<Box<dyn SessionStream>>,
}

fn alpn(port: u16) -> &'static [&'static str] {
    if port == 993 {
        &[]
    } else {
        &["imap"]
    }
}

impl Client {
    fn new(stream: Box<dyn SessionStream>) -> Self {
        Self {
            inner: ImapClient::new(stream),
        }
    }

    /// On rejection the client is handed back so the caller can retry.
    pub(crate) async fn login(
        self,
        username: &str,
        password: &str,
    ) -> Result<ImapSession<Box<dyn SessionStream>>, (async_imap::error::Error, Client)> {
        let Client { inner } = self;
        inner
            .login(username, password)
            .await
            .map_err(|(e, inner)| (e, Client { inner }))
    }

    /// Wraps an already established transport and waits for the server greeting.
    pub(crate) async fn from_stream(stream: Box<dyn SessionStream>) -> MailBridgeResult<Self> {
        let mut client = Client::new(stream);
        read_greeting(&mut client.inner).await?;
        Ok(client)
    }

    pub(crate) async fn connection(
        server: &ServerConfig,
        io_timeout: Duration,
    ) -> MailBridgeResult<Self> {
        let domain = server.host.as_str();
        let resolved_addr = Self::resolve_to_socket_addr(domain, server.port)?;
        debug!("Attempting IMAP connection to {domain} ({resolved_addr}).");
        match server.encryption {
            Encryption::Ssl => {
                Self::establish_secure_connection(resolved_addr, domain, io_timeout).await
            }
            Encryption::StartTls => {
                Self::establish_starttls_connection(resolved_addr, domain, io_timeout).await
            }
            Encryption::None => Self::establish_insecure_connection(resolved_addr, io_timeout).await,
        }
    }

    async fn establish_secure_connection(
        address: SocketAddr,
        server_hostname: &str,
        io_timeout: Duration,
    ) -> MailBridgeResult<Self> {
        let tls_stream =
            connect_tls(address, server_hostname, alpn(address.port()), io_timeout).await?;
        let session_stream: Box<dyn SessionStream> = Box::new(BufWriter::new(tls_stream));
        Self::from_stream(session_stream).await
    }

    async fn establish_insecure_connection(
        address: SocketAddr,
        io_timeout: Duration,
    ) -> MailBridgeResult<Self> {
        let tcp_stream = connect_tcp(address, io_timeout).await?;
        let session_stream: Box<dyn SessionStream> = Box::new(BufWriter::new(tcp_stream));
        Self::from_stream(session_stream).await
    }

    async fn establish_starttls_connection(
        address: SocketAddr,
        server_hostname: &str,
        io_timeout: Duration,
    ) -> MailBridgeResult<Self> {
        let tcp_stream = connect_tcp(address, io_timeout).await?;
        let mut client = async_imap::Client::new(BufWriter::new(tcp_stream));
        read_greeting(&mut client).await?;

        client
            .run_command_and_check_ok("STARTTLS", None)
            .await
            .map_err(|e| {
                raise_error!(
                    format!("STARTTLS command failed: {:#?}", e),
                    ErrorCode::NetworkError
                )
            })?;

        // The greeting was already consumed on the plain connection.
        let tcp_stream = client.into_inner().into_inner();
        let tls_stream = upgrade_to_tls(server_hostname, &[], tcp_stream).await?;
        let session_stream: Box<dyn SessionStream> = Box::new(BufWriter::new(tls_stream));
        Ok(Client::new(session_stream))
    }

    fn resolve_to_socket_addr(domain: &str, port: u16) -> MailBridgeResult<SocketAddr> {
        if domain.is_empty() || domain.contains(|c: char| !c.is_ascii() && c != '.') {
            return Err(raise_error!(
                "Invalid domain format".into(),
                ErrorCode::InvalidParameter
            ));
        }
        let address = format!("{}:{}", domain, port);
        let socket_addrs = address
            .to_socket_addrs()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::NetworkError))?;

        socket_addrs.into_iter().next().ok_or_else(|| {
            raise_error!("Unable to resolve address".into(), ErrorCode::NetworkError)
        })
    }
}

async fn read_greeting<T>(client: &mut ImapClient<T>) -> MailBridgeResult<()>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + std::fmt::Debug,
{
    let greeting = client.read_response().await.map_err(|e| {
        raise_error!(
            format!("failed to read the server greeting: {}", e),
            ErrorCode::NetworkError
        )
    })?;
    greeting.ok_or_else(|| {
        raise_error!(
            "connection closed before the server greeting".into(),
            ErrorCode::NetworkError
        )
    })?;
    Ok(())
}
