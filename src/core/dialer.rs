//! Establishing new connections.
//!
//! A [`Dialer`] opens a TCP stream to the configured address and runs the
//! connection handshake (`AUTH`, `SELECT`, `CLIENT SETNAME`) before handing
//! the [`Connection`] to the pool. The pool only sees the [`Connect`] trait,
//! so tests can substitute their own factory.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::core::command::{self, Cmd};
use crate::core::connection::{BoxedStream, Connection};
use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

const DEFAULT_PORT: u16 = 6379;

/// Something that can produce fresh connections for a pool.
pub trait Connect: Send + Sync {
    /// Opens and initialises a new connection.
    fn connect(&self) -> BoxFuture<'_, Result<Connection>>;
}

/// Connection parameters for a single Redis server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialerConfig {
    /// `host:port` of the server.
    pub address: String,
    /// ACL username, sent with the password when both are set.
    pub username: Option<String>,
    /// Password for `AUTH`.
    pub password: Option<String>,
    /// Database index for `SELECT`; `0` skips the command.
    pub database: i64,
    /// Name registered with `CLIENT SETNAME`.
    pub client_name: Option<String>,
    /// Bound on the TCP connect.
    pub connect_timeout: Option<Duration>,
    /// Bound on reading each reply.
    pub read_timeout: Option<Duration>,
    /// Bound on writing each request.
    pub write_timeout: Option<Duration>,
}

impl DialerConfig {
    /// Creates a configuration for `address` (`host:port`) with no
    /// credentials and no timeouts.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            username: None,
            password: None,
            database: 0,
            client_name: None,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
        }
    }

    /// Parses either a `redis://[user:pass@]host[:port][/db]` URL or a bare
    /// `host:port` pair. A missing host (`":6379"`) means localhost.
    ///
    /// # Example
    ///
    /// ```
    /// use respool::core::dialer::DialerConfig;
    ///
    /// let config = DialerConfig::from_url("redis://:secret@cache:6380/2").unwrap();
    /// assert_eq!(config.address, "cache:6380");
    /// assert_eq!(config.password.as_deref(), Some("secret"));
    /// assert_eq!(config.database, 2);
    /// ```
    pub fn from_url(address: &str) -> Result<Self> {
        if !address.contains("://") {
            return Ok(Self::new(normalize_host_port(address)?));
        }

        let parsed = url::Url::parse(address).map_err(|e| Error::InvalidArgument {
            message: format!("invalid address format: {}", e),
        })?;
        if parsed.scheme() != "redis" {
            return Err(Error::InvalidArgument {
                message: format!("unsupported scheme {:?}, expected redis://", parsed.scheme()),
            });
        }

        let host = match parsed.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => "127.0.0.1",
        };
        let port = parsed.port().unwrap_or(DEFAULT_PORT);
        let mut config = Self::new(format!("{}:{}", host, port));

        if !parsed.username().is_empty() {
            config.username = Some(parsed.username().to_string());
        }
        config.password = parsed.password().map(str::to_string);

        let path = parsed.path().trim_start_matches('/');
        if !path.is_empty() {
            config.database = path.parse().map_err(|_| Error::InvalidArgument {
                message: format!("invalid database index {:?}", path),
            })?;
        }
        Ok(config)
    }
}

fn normalize_host_port(address: &str) -> Result<String> {
    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port.parse().map_err(|_| Error::InvalidArgument {
                message: format!("invalid port in address {:?}", address),
            })?;
            (host, port)
        }
        None => (address, DEFAULT_PORT),
    };
    let host = if host.is_empty() { "127.0.0.1" } else { host };
    Ok(format!("{}:{}", host, port))
}

/// The default [`Connect`] implementation: TCP plus handshake.
#[derive(Debug, Clone)]
pub struct Dialer {
    config: DialerConfig,
}

impl Dialer {
    /// Creates a dialer for the given configuration.
    pub fn new(config: DialerConfig) -> Self {
        Self { config }
    }

    /// The configuration this dialer connects with.
    pub fn config(&self) -> &DialerConfig {
        &self.config
    }

    /// Opens a TCP connection and runs the handshake.
    pub async fn dial(&self) -> Result<Connection> {
        let config = &self.config;
        debug!(address = %config.address, "dialing");

        let connect = TcpStream::connect(config.address.as_str());
        let stream = match config.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_| Error::Timeout { timeout })??,
            None => connect.await?,
        };
        stream.set_nodelay(true)?;

        let stream: BoxedStream = Box::new(stream);
        let mut conn =
            Connection::new(stream).with_timeouts(config.read_timeout, config.write_timeout);

        if let Err(e) = handshake(&mut conn, config).await {
            warn!(address = %config.address, error = %e, "handshake failed");
            return Err(e);
        }
        debug!(address = %config.address, connection = conn.id(), "connected");
        Ok(conn)
    }
}

impl Connect for Dialer {
    fn connect(&self) -> BoxFuture<'_, Result<Connection>> {
        Box::pin(self.dial())
    }
}

/// Runs `AUTH`, `SELECT` and `CLIENT SETNAME` as configured.
pub(crate) async fn handshake<S>(conn: &mut Connection<S>, config: &DialerConfig) -> Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    if let Some(password) = &config.password {
        let cmd = match &config.username {
            Some(username) => command::auth_with_username(username, password),
            None => command::auth(password),
        };
        if let Frame::Error(message) = conn.send(&cmd).await? {
            return Err(Error::Auth { message });
        }
    }

    if config.database != 0 {
        expect_ok(conn, &command::select(config.database)).await?;
    }

    if let Some(name) = &config.client_name {
        expect_ok(conn, &command::client_setname(name)).await?;
    }
    Ok(())
}

async fn expect_ok<S>(conn: &mut Connection<S>, cmd: &Cmd) -> Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    match conn.send(cmd).await? {
        Frame::Error(message) => Err(Error::Server { message }),
        _ => Ok(()),
    }
}
