// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::modules::account::entity::{ClientIdentity, MailAccount, ServerConfig};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::{ActionFailure, MailBridgeError, MailBridgeResult};
use crate::modules::imap::client::Client;
use crate::modules::imap::session::SessionStream;
use crate::{action_failed, decode_mailbox_name, raise_error, run_with_timeout};
use async_imap::error::Error as ImapError;
use imap_proto::{AttributeValue, MailboxDatum, NameAttribute, Response, ResponseCode, Status};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

type ImapSession = async_imap::Session<Box<dyn SessionStream>>;

pub const INBOX: &str = "INBOX";

/// Observable protocol state of a [`MailSession`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    /// Greeting received, not logged in.
    Connected,
    Authenticated,
    Selected(String),
}

enum SessionState {
    Disconnected,
    Connected(Client),
    Authenticated {
        session: ImapSession,
        selected: Option<String>,
    },
}

/// A single stateful IMAP connection.
///
/// Requests are serialized through an async mutex. Each request runs to
/// completion on its own task, so a caller that stops waiting never leaves the
/// connection in the middle of an exchange.
#[derive(Clone)]
pub struct MailSession {
    label: Arc<str>,
    server: ServerConfig,
    identity: ClientIdentity,
    timeout: Duration,
    state: Arc<Mutex<SessionState>>,
}

impl fmt::Debug for MailSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailSession")
            .field("label", &self.label)
            .field("server", &self.server)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Strips one pair of enclosing quotes, then quotes names containing a space.
pub fn normalize_mailbox_name(name: &str) -> String {
    let bare = if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
        &name[1..name.len() - 1]
    } else {
        name
    };
    if bare.contains(' ') {
        format!("\"{}\"", bare)
    } else {
        bare.to_string()
    }
}

fn quote_search_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

impl MailSession {
    pub fn new(account: &MailAccount) -> Self {
        Self {
            label: Arc::from(format!("Bot <{}>", account.address)),
            server: account.imap.clone(),
            identity: account.client.clone(),
            timeout: account.timeout(),
            state: Arc::new(Mutex::new(SessionState::Disconnected)),
        }
    }

    pub async fn state(&self) -> SessionStatus {
        match &*self.state.lock().await {
            SessionState::Disconnected => SessionStatus::Disconnected,
            SessionState::Connected(_) => SessionStatus::Connected,
            SessionState::Authenticated { selected: None, .. } => SessionStatus::Authenticated,
            SessionState::Authenticated {
                selected: Some(mailbox),
                ..
            } => SessionStatus::Selected(mailbox.clone()),
        }
    }

    pub async fn selected_mailbox(&self) -> Option<String> {
        match self.state().await {
            SessionStatus::Selected(mailbox) => Some(mailbox),
            _ => None,
        }
    }

    /// Opens the configured transport and waits for the greeting.
    /// An existing connection is dropped first.
    pub async fn connect(&self) -> MailBridgeResult<()> {
        let mut state = self.state.clone().lock_owned().await;
        let (label, server, timeout) = (self.label.clone(), self.server.clone(), self.timeout);
        detach(async move {
            debug!("{label}: connecting to {}:{}", server.host, server.port);
            *state = SessionState::Disconnected;
            let client = run_with_timeout!(
                timeout,
                Client::connection(&server, timeout),
                timed_out("CONNECT", timeout)
            )??;
            info!("{label}: connected to {}:{}", server.host, server.port);
            *state = SessionState::Connected(client);
            Ok(())
        })
        .await
    }

    /// Same as [`MailSession::connect`] over a caller-supplied transport.
    pub async fn connect_with_stream(&self, stream: Box<dyn SessionStream>) -> MailBridgeResult<()> {
        let mut state = self.state.clone().lock_owned().await;
        let (label, timeout) = (self.label.clone(), self.timeout);
        detach(async move {
            *state = SessionState::Disconnected;
            let client = run_with_timeout!(
                timeout,
                Client::from_stream(stream),
                timed_out("CONNECT", timeout)
            )??;
            debug!("{label}: greeting received");
            *state = SessionState::Connected(client);
            Ok(())
        })
        .await
    }

    /// Logs in and identifies the client. `false` means the server refused
    /// either step; a refused `ID` still leaves the session authenticated.
    pub async fn login(&self, address: &str, secret: &str) -> MailBridgeResult<bool> {
        let mut state = self.state.clone().lock_owned().await;
        let (label, identity, timeout) =
            (self.label.clone(), self.identity.clone(), self.timeout);
        let (address, secret) = (address.to_string(), secret.to_string());
        detach(async move {
            state
                .login(&label, &address, &secret, &identity, timeout)
                .await
        })
        .await
    }

    pub async fn select_mailbox(&self, name: &str) -> MailBridgeResult<bool> {
        let mut state = self.state.clone().lock_owned().await;
        let (label, timeout) = (self.label.clone(), self.timeout);
        let mailbox = normalize_mailbox_name(name);
        detach(async move { state.select(&label, mailbox, timeout).await }).await
    }

    /// UIDs of unseen mails in the selected mailbox, ascending.
    pub async fn search_unseen(&self) -> MailBridgeResult<Vec<String>> {
        let mut state = self.state.clone().lock_owned().await;
        let (label, timeout) = (self.label.clone(), self.timeout);
        detach(async move {
            let uids = state.uid_search(&label, "UNSEEN".into(), timeout).await?;
            Ok(uids.into_iter().map(|uid| uid.to_string()).collect())
        })
        .await
    }

    /// Lowest UID in the selected mailbox carrying the given `Message-ID`.
    pub async fn search_by_message_id(&self, message_id: &str) -> MailBridgeResult<Option<String>> {
        let mut state = self.state.clone().lock_owned().await;
        let (label, timeout) = (self.label.clone(), self.timeout);
        let query = format!("HEADER Message-ID {}", quote_search_value(message_id));
        detach(async move {
            let uids = state.uid_search(&label, query, timeout).await?;
            Ok(uids.first().map(|uid| uid.to_string()))
        })
        .await
    }

    /// Full RFC822 bytes of a mail, `None` when the server returned no body.
    pub async fn fetch_raw(&self, uid: &str) -> MailBridgeResult<Option<Vec<u8>>> {
        let uid: u32 = uid.trim().parse().map_err(|_| {
            raise_error!(
                format!("'{}' is not a valid IMAP UID", uid),
                ErrorCode::InvalidParameter
            )
        })?;
        let mut state = self.state.clone().lock_owned().await;
        let (label, timeout) = (self.label.clone(), self.timeout);
        detach(async move { state.fetch_rfc822(&label, uid, timeout).await }).await
    }

    /// Names of every mailbox carrying the `\Sent` special-use attribute.
    pub async fn list_mailboxes(&self) -> MailBridgeResult<Vec<String>> {
        let mut state = self.state.clone().lock_owned().await;
        let (label, timeout) = (self.label.clone(), self.timeout);
        detach(async move { state.list_sent(&label, timeout).await }).await
    }

    pub async fn logout(&self) -> MailBridgeResult<bool> {
        let mut state = self.state.clone().lock_owned().await;
        let (label, timeout) = (self.label.clone(), self.timeout);
        detach(async move { state.logout(&label, timeout).await }).await
    }

    /// Drops the connection without saying goodbye.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        if !matches!(*state, SessionState::Disconnected) {
            debug!("{}: dropping connection", self.label);
        }
        *state = SessionState::Disconnected;
    }
}

/// Runs a request on its own task so it completes even if the caller goes away.
async fn detach<T, F>(task: F) -> MailBridgeResult<T>
where
    T: Send + 'static,
    F: Future<Output = MailBridgeResult<T>> + Send + 'static,
{
    match tokio::spawn(task).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(raise_error!(
            format!("IMAP request task was cancelled: {}", e),
            ErrorCode::InternalError
        )),
    }
}

fn timed_out(command: &str, timeout: Duration) -> MailBridgeError {
    raise_error!(
        format!(
            "IMAP command `{}` timed out after {}s",
            command,
            timeout.as_secs_f32()
        ),
        ErrorCode::ConnectionTimeout
    )
}

fn uninitialized(command: &str, required: &str) -> MailBridgeError {
    raise_error!(
        format!("IMAP command `{}` requires a {} session", command, required),
        ErrorCode::UninitializedSession
    )
}

fn classify(command: &str, error: ImapError) -> MailBridgeError {
    match error {
        ImapError::No(response) | ImapError::Bad(response) => action_failed!(ActionFailure::Imap {
            command: command.to_string(),
            response,
        }),
        ImapError::Io(e) => raise_error!(
            format!("IMAP command `{}` failed on I/O: {}", command, e),
            ErrorCode::NetworkError
        ),
        ImapError::ConnectionLost => raise_error!(
            format!("connection lost during IMAP command `{}`", command),
            ErrorCode::NetworkError
        ),
        other => raise_error!(
            format!("IMAP command `{}` returned an unexpected result: {:#?}", command, other),
            ErrorCode::ImapUnexpectedResult
        ),
    }
}

fn is_rejection(error: &MailBridgeError) -> bool {
    matches!(error.action_failure(), Some(ActionFailure::Imap { .. }))
}

fn drain_unsolicited(label: &str, session: &mut ImapSession) {
    while let Ok(response) = session.unsolicited_responses.try_recv() {
        trace!("{label}: unsolicited {:?}", response);
    }
}

/// Sends `command` and hands every untagged response to `visit` until the
/// tagged completion arrives, which must be OK.
async fn exchange<F>(session: &mut ImapSession, command: &str, mut visit: F) -> Result<(), ImapError>
where
    F: FnMut(&Response<'_>) + Send,
{
    let id = session.run_command(command).await?;
    loop {
        let Some(response) = session.read_response().await? else {
            return Err(ImapError::ConnectionLost);
        };
        if let Response::Done {
            tag,
            status,
            code,
            information,
        } = response.parsed()
        {
            if *tag != id {
                continue;
            }
            let text = rejection_text(code.as_ref(), information.as_deref());
            return match status {
                Status::Ok => Ok(()),
                Status::No => Err(ImapError::No(text)),
                Status::Bad => Err(ImapError::Bad(text)),
                other => Err(ImapError::Io(std::io::Error::other(format!(
                    "unexpected completion {:?}: {}",
                    other, text
                )))),
            };
        }
        visit(response.parsed());
    }
}

fn rejection_text(code: Option<&ResponseCode<'_>>, information: Option<&str>) -> String {
    let information = information.unwrap_or_default().trim();
    match code {
        Some(code) => format!("[{:?}] {}", code, information),
        None => information.to_string(),
    }
}

impl SessionState {
    fn session(&mut self, command: &str) -> MailBridgeResult<&mut ImapSession> {
        match self {
            SessionState::Authenticated { session, .. } => Ok(session),
            _ => Err(uninitialized(command, "authenticated")),
        }
    }

    fn selected_session(&mut self, command: &str) -> MailBridgeResult<&mut ImapSession> {
        match self {
            SessionState::Authenticated {
                session,
                selected: Some(_),
            } => Ok(session),
            _ => Err(uninitialized(command, "selected")),
        }
    }

    /// Folds a finished round trip into a result, dropping the connection on
    /// transport failures.
    fn settle<T>(
        &mut self,
        label: &str,
        command: &str,
        outcome: MailBridgeResult<Result<T, ImapError>>,
    ) -> MailBridgeResult<T> {
        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify(command, e)),
            Err(e) => Err(e),
        };
        match &result {
            Err(e) if e.is_network() => {
                warn!("{label}: {e}; connection dropped");
                *self = SessionState::Disconnected;
            }
            _ => {
                if let SessionState::Authenticated { session, .. } = self {
                    drain_unsolicited(label, session);
                }
            }
        }
        result
    }

    async fn login(
        &mut self,
        label: &str,
        address: &str,
        secret: &str,
        identity: &ClientIdentity,
        timeout: Duration,
    ) -> MailBridgeResult<bool> {
        let client = match std::mem::replace(self, SessionState::Disconnected) {
            SessionState::Connected(client) => client,
            other => {
                *self = other;
                return Err(uninitialized("LOGIN", "connected"));
            }
        };

        // A timed out login takes the client with it; the state stays Disconnected.
        let session = match run_with_timeout!(
            timeout,
            client.login(address, secret),
            timed_out("LOGIN", timeout)
        )? {
            Ok(session) => session,
            Err((e, client)) => {
                let error = classify("LOGIN", e);
                if is_rejection(&error) {
                    warn!("{label}: login rejected: {error}");
                    *self = SessionState::Connected(client);
                    return Ok(false);
                }
                warn!("{label}: login failed: {error}");
                return Err(error);
            }
        };
        info!("{label}: logged in as {address}");
        *self = SessionState::Authenticated {
            session,
            selected: None,
        };

        let command = format!(
            "ID (\"name\" {} \"version\" {})",
            quote_search_value(&identity.name),
            quote_search_value(&identity.version)
        );
        let session = self.session("ID")?;
        let outcome = run_with_timeout!(
            timeout,
            session.run_command_and_check_ok(&command),
            timed_out("ID", timeout)
        );
        match self.settle(label, "ID", outcome) {
            Ok(()) => Ok(true),
            Err(e) if is_rejection(&e) => {
                warn!("{label}: client identification rejected: {e}");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn select(
        &mut self,
        label: &str,
        mailbox: String,
        timeout: Duration,
    ) -> MailBridgeResult<bool> {
        let command = format!("SELECT {}", mailbox);
        let outcome = match self {
            SessionState::Authenticated { session, selected } => {
                // A failed SELECT leaves the server with no mailbox selected.
                *selected = None;
                run_with_timeout!(
                    timeout,
                    session.run_command_and_check_ok(&command),
                    timed_out(&command, timeout)
                )
            }
            _ => return Err(uninitialized("SELECT", "authenticated")),
        };
        match self.settle(label, &command, outcome) {
            Ok(()) => {
                debug!("{label}: selected {}", decode_mailbox_name!(&mailbox));
                if let SessionState::Authenticated { selected, .. } = self {
                    *selected = Some(mailbox);
                }
                Ok(true)
            }
            Err(e) if is_rejection(&e) => {
                warn!("{label}: cannot select {}: {e}", decode_mailbox_name!(&mailbox));
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn uid_search(
        &mut self,
        label: &str,
        query: String,
        timeout: Duration,
    ) -> MailBridgeResult<Vec<u32>> {
        let command = format!("UID SEARCH {}", query);
        let session = self.selected_session(&command)?;
        let mut uids: Vec<u32> = Vec::new();
        let outcome = run_with_timeout!(
            timeout,
            exchange(session, &command, |response| {
                if let Response::MailboxData(MailboxDatum::Search(found)) = response {
                    uids.extend_from_slice(found);
                }
            }),
            timed_out(&command, timeout)
        );
        self.settle(label, &command, outcome)?;
        uids.sort_unstable();
        uids.dedup();
        debug!("{label}: {command} matched {} mail(s)", uids.len());
        Ok(uids)
    }

    async fn fetch_rfc822(
        &mut self,
        label: &str,
        uid: u32,
        timeout: Duration,
    ) -> MailBridgeResult<Option<Vec<u8>>> {
        let command = format!("UID FETCH {} RFC822", uid);
        let session = self.selected_session(&command)?;
        let mut body: Option<Vec<u8>> = None;
        let outcome = run_with_timeout!(
            timeout,
            exchange(session, &command, |response| {
                if let Response::Fetch(_, attributes) = response {
                    for attribute in attributes {
                        if let AttributeValue::Rfc822(Some(raw)) = attribute {
                            body.get_or_insert_with(|| raw.to_vec());
                        }
                    }
                }
            }),
            timed_out(&command, timeout)
        );
        self.settle(label, &command, outcome)?;
        if body.is_none() {
            debug!("{label}: {command} returned no body");
        }
        Ok(body)
    }

    async fn list_sent(&mut self, label: &str, timeout: Duration) -> MailBridgeResult<Vec<String>> {
        let command = "LIST \"\" \"*\"";
        let session = self.session(command)?;
        let mut sent: Vec<String> = Vec::new();
        let outcome = run_with_timeout!(
            timeout,
            exchange(session, command, |response| {
                if let Response::MailboxData(MailboxDatum::List {
                    name_attributes,
                    name,
                    ..
                }) = response
                {
                    if name_attributes
                        .iter()
                        .any(|attr| matches!(attr, NameAttribute::Sent))
                    {
                        sent.push(name.to_string());
                    }
                }
            }),
            timed_out(command, timeout)
        );
        self.settle(label, command, outcome)?;
        for name in &sent {
            trace!("{label}: sent mailbox {}", decode_mailbox_name!(name));
        }
        Ok(sent)
    }

    async fn logout(&mut self, label: &str, timeout: Duration) -> MailBridgeResult<bool> {
        let session = self.session("LOGOUT")?;
        let outcome = run_with_timeout!(timeout, session.logout(), timed_out("LOGOUT", timeout));
        match self.settle(label, "LOGOUT", outcome) {
            Ok(()) => {
                info!("{label}: logged out");
                *self = SessionState::Disconnected;
                Ok(true)
            }
            Err(e) if is_rejection(&e) => {
                warn!("{label}: logout rejected: {e}");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
