// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_imap::Client as AsyncImapClient;
use log::{debug, error, info, warn};
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName as PkiServerName;
use tokio::net::TcpStream as TokioTcpStream;
use tokio::time::timeout;
use tokio_rustls::{client::TlsStream, TlsConnector};
use tokio_util::compat::TokioAsyncReadCompatExt;

use crate::imap::error::ImapError;
use crate::imap::session::{
    AsyncImapSessionWrapper, MailboxSession, SessionFactory, SessionFuture, TlsCompatibleStream,
    TlsImapSession,
};

/// Where and how to log in.
#[derive(Clone)]
pub struct ImapCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub login_timeout: Duration,
}

impl fmt::Debug for ImapCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Trust store built from the platform's native roots.
fn tls_connector() -> Result<TlsConnector, ImapError> {
    let mut roots = RootCertStore::empty();
    let (loaded, skipped) = roots.add_parsable_certificates(rustls_native_certs::load_native_certs()?);
    debug!("Trusting {} native roots ({} unusable)", loaded, skipped);
    if roots.is_empty() {
        warn!("No usable native root certificates; TLS handshakes will fail");
    }

    let tls_config = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(tls_config)))
}

async fn open_tls(
    host: &str,
    port: u16,
    connector: &TlsConnector,
) -> Result<TlsStream<TokioTcpStream>, ImapError> {
    let server_name = PkiServerName::try_from(host.to_string())
        .map_err(|_| ImapError::Connection(format!("not a valid host name: {}", host)))?;

    let tcp = TokioTcpStream::connect((host, port)).await?;
    debug!("TCP connection to {}:{} open, starting TLS", host, port);

    connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| ImapError::Tls(e.to_string()))
}

async fn login(
    stream: TlsCompatibleStream,
    credentials: &ImapCredentials,
) -> Result<TlsImapSession, ImapError> {
    let login = AsyncImapClient::new(stream).login(&credentials.username, &credentials.password);

    match timeout(credentials.login_timeout, login).await {
        Ok(Ok(session)) => {
            debug!("Logged in as {}", credentials.username);
            Ok(session)
        }
        Ok(Err((e, _))) => {
            error!("Login for {} rejected: {}", credentials.username, e);
            Err(ImapError::Auth(e.to_string()))
        }
        Err(_) => {
            error!("Login for {} gave no answer within {:?}", credentials.username, credentials.login_timeout);
            Err(ImapError::Timeout("login".to_string()))
        }
    }
}

/// Connects, performs TLS and logs in, returning a session ready for polling.
pub async fn connect(
    credentials: &ImapCredentials,
    connector: &TlsConnector,
) -> Result<AsyncImapSessionWrapper, ImapError> {
    info!("Connecting to {}:{} as '{}'", credentials.host, credentials.port, credentials.username);

    let handshake = open_tls(&credentials.host, credentials.port, connector);
    let tls_stream = timeout(credentials.login_timeout, handshake)
        .await
        .map_err(|_| ImapError::Timeout(format!("connect to {}", credentials.host)))??;

    let session = login(tls_stream.compat(), credentials).await?;
    Ok(AsyncImapSessionWrapper::new(session))
}

/// Creates a factory that opens a fresh authenticated session per call.
///
/// The TLS configuration is built once and shared by every session.
pub fn create_session_factory(credentials: ImapCredentials) -> Result<SessionFactory, ImapError> {
    let connector = Arc::new(tls_connector()?);
    let credentials = Arc::new(credentials);

    Ok(Arc::new(move || -> SessionFuture {
        let connector = connector.clone();
        let credentials = credentials.clone();
        Box::pin(async move {
            connect(&credentials, &connector)
                .await
                .map(|session| Box::new(session) as Box<dyn MailboxSession>)
        })
    }))
}
