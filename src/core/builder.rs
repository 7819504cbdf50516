use std::time::Duration;

use crate::core::dialer::{Dialer, DialerConfig};
use crate::core::pool::{Pool, PoolConfig};
use crate::{Client, Error};

/// Builder for configuring and creating a pooled [`Client`].
///
/// Values set on the builder override those parsed from the address URL.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use respool::core::builder::ClientBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ClientBuilder::new()
///     .address("redis://localhost:6379")
///     .password("secret")
///     .database(0)
///     .max_idle(16)
///     .max_active(64)
///     .wait_timeout(Duration::from_secs(1))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ClientBuilder {
    address: Option<String>,
    password: Option<String>,
    username: Option<String>,
    database: Option<u8>,
    client_name: Option<String>,
    connection_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    pool: PoolConfig,
}

impl ClientBuilder {
    /// Creates a new [`ClientBuilder`] instance.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Redis server address.
    ///
    /// # Arguments
    ///
    /// * `address` - `redis://[user:pass@]host[:port][/db]` or `host:port`
    #[inline]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Sets the password for authentication.
    ///
    /// # Arguments
    ///
    /// * `password` - Password string
    #[inline]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the username for ACL authentication.
    ///
    /// # Arguments
    ///
    /// * `username` - Username string
    #[inline]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the Redis database number to select after connection.
    ///
    /// # Arguments
    ///
    /// * `database` - Database number (0-15)
    #[inline]
    pub fn database(mut self, database: u8) -> Self {
        self.database = Some(database);
        self
    }

    /// Sets the client connection name.
    ///
    /// # Arguments
    ///
    /// * `name` - Client name displayed in `CLIENT LIST`
    #[inline]
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    /// Sets the connection timeout.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Maximum time to wait for the TCP connection
    #[inline]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Sets the read timeout for commands.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Maximum time to wait for a response. `None` means no timeout.
    #[inline]
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the write timeout for commands.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Maximum time to wait for writes. `None` means no timeout.
    #[inline]
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the maximum number of idle connections kept for reuse.
    ///
    /// # Arguments
    ///
    /// * `max_idle` - Idle set capacity (default: 80)
    #[inline]
    pub fn max_idle(mut self, max_idle: usize) -> Self {
        self.pool.max_idle = max_idle;
        self
    }

    /// Sets the maximum number of connections open at once.
    ///
    /// # Arguments
    ///
    /// * `max_active` - Connection limit, `0` for unbounded (default: 12000)
    #[inline]
    pub fn max_active(mut self, max_active: usize) -> Self {
        self.pool.max_active = max_active;
        self
    }

    /// Chooses between waiting for a free connection and failing fast with
    /// [`Error::PoolExhausted`].
    #[inline]
    pub fn wait(mut self, wait: bool) -> Self {
        self.pool.wait = wait;
        self
    }

    /// Bounds how long a caller waits for a free connection.
    #[inline]
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.pool.wait_timeout = Some(timeout);
        self
    }

    /// Closes idle connections that have not been used for `timeout`.
    #[inline]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool.idle_timeout = Some(timeout);
        self
    }

    /// Resolves the address and explicit settings into a dialer config.
    fn dialer_config(&self) -> Result<DialerConfig, Error> {
        let address = self.address.as_deref().ok_or_else(|| Error::InvalidArgument {
            message: "address is required".to_string(),
        })?;

        let mut config = DialerConfig::from_url(address)?;
        if self.username.is_some() {
            config.username = self.username.clone();
        }
        if self.password.is_some() {
            config.password = self.password.clone();
        }
        if let Some(database) = self.database {
            config.database = i64::from(database);
        }
        config.client_name = self.client_name.clone();
        config.connect_timeout = self.connection_timeout;
        config.read_timeout = self.read_timeout;
        config.write_timeout = self.write_timeout;
        Ok(config)
    }

    /// Builds the [`Client`]. No connection is opened until the first
    /// command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the address is missing or
    /// malformed.
    pub fn build(self) -> Result<Client, Error> {
        let config = self.dialer_config()?;
        let pool = Pool::new(self.pool, Dialer::new(config));
        Ok(Client::with_pool(pool))
    }
}
