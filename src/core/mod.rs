//! # Core
//!
//! Connections, the pool that bounds them, and the client that ties the pool
//! to reply coercion and struct marshalling.
//!
//! ## Modules
//!
//! - [`connection`] - Single connection management
//! - [`dialer`] - Opening connections and the handshake
//! - [`pool`] - Bounded connection pool
//! - [`command`] - Command builders
//! - [`reply`] - Reply coercion
//! - [`deadline`] - Per-call deadlines
//! - [`builder`] - Client builder

use std::collections::HashMap;
use std::time::Duration;

use tracing::instrument;

pub use crate::proto::error::{Error, Result};

/// Client builder configuration.
pub mod builder;
/// Command construction helpers.
pub mod command;
/// Low-level connection management.
pub mod connection;
pub mod deadline;
pub mod dialer;
pub mod pool;
pub mod reply;

use crate::marshal::{self, Flatten, RedisFields};
use crate::proto::arg::Arg;
use crate::proto::frame::Frame;
use builder::ClientBuilder;
use command::Cmd;
use pool::{Pool, PooledConnection};

/// Redis client backed by a connection pool.
///
/// Every call checks a connection out, runs one command and hands the
/// connection back. Clones share the same pool.
///
/// # Example
///
/// ```no_run
/// use respool::core::command::Cmd;
/// use respool::core::Client;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::open("redis://localhost:6379")?;
///     client.query(&Cmd::new("SET").arg("key").arg("value")).await?;
///     let value = client.string(&Cmd::new("GET").arg("key")).await?;
///     assert_eq!(value, "value");
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    pool: Pool,
}

impl Client {
    /// Creates a client for `address` with default pool settings.
    ///
    /// Accepts `redis://[user:pass@]host[:port][/db]` or a bare `host:port`.
    /// No connection is opened until the first command.
    pub fn open(address: impl Into<String>) -> Result<Self> {
        ClientBuilder::new().address(address).build()
    }

    /// Wraps an existing pool.
    pub fn with_pool(pool: Pool) -> Self {
        Self { pool }
    }

    /// The pool behind this client.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Checks a connection out for several commands in a row.
    pub async fn get_connection(&self) -> Result<PooledConnection> {
        self.pool.get().await
    }

    /// Runs one command and returns the raw reply. Error replies come back
    /// as `Ok(Frame::Error(..))`.
    #[instrument(skip_all, fields(command = cmd.name()), level = "debug")]
    pub async fn query(&self, cmd: &Cmd) -> Result<Frame> {
        let mut conn = self.pool.get().await?;
        conn.send(cmd).await
    }

    /// Like [`query`](Client::query), with a read deadline for this call.
    #[instrument(skip_all, fields(command = cmd.name(), timeout = ?timeout), level = "debug")]
    pub async fn query_with_timeout(&self, cmd: &Cmd, timeout: Duration) -> Result<Frame> {
        deadline::do_with_timeout(&self.pool, timeout, cmd).await
    }

    /// Runs `cmd` and coerces the reply with [`reply::int64`].
    pub async fn int64(&self, cmd: &Cmd) -> Result<i64> {
        reply::int64(self.query(cmd).await)
    }

    /// Runs `cmd` and coerces the reply with [`reply::float64`].
    pub async fn float64(&self, cmd: &Cmd) -> Result<f64> {
        reply::float64(self.query(cmd).await)
    }

    /// Runs `cmd` and coerces the reply with [`reply::string`].
    pub async fn string(&self, cmd: &Cmd) -> Result<String> {
        reply::string(self.query(cmd).await)
    }

    /// [`string`](Client::string) under a per-call deadline, for blocking
    /// commands.
    pub async fn string_with_timeout(&self, cmd: &Cmd, timeout: Duration) -> Result<String> {
        reply::string(self.query_with_timeout(cmd, timeout).await)
    }

    /// Runs `cmd` and coerces the reply with [`reply::boolean`].
    pub async fn boolean(&self, cmd: &Cmd) -> Result<bool> {
        reply::boolean(self.query(cmd).await)
    }

    /// Runs `cmd` and coerces the reply with [`reply::status_ok`].
    pub async fn status_ok(&self, cmd: &Cmd) -> Result<bool> {
        reply::status_ok(self.query(cmd).await)
    }

    /// Runs `cmd` and coerces the reply with [`reply::strings`].
    pub async fn strings(&self, cmd: &Cmd) -> Result<Vec<String>> {
        reply::strings(self.query(cmd).await)
    }

    /// [`strings`](Client::strings) under a per-call deadline, e.g. for
    /// `BLPOP`.
    pub async fn strings_with_timeout(&self, cmd: &Cmd, timeout: Duration) -> Result<Vec<String>> {
        reply::strings(self.query_with_timeout(cmd, timeout).await)
    }

    /// Runs `cmd` and coerces the reply with [`reply::string_map`].
    pub async fn string_map(&self, cmd: &Cmd) -> Result<HashMap<String, String>> {
        reply::string_map(self.query(cmd).await)
    }

    /// Runs `cmd` and coerces the reply with [`reply::values`].
    pub async fn values(&self, cmd: &Cmd) -> Result<Vec<Frame>> {
        reply::values(self.query(cmd).await)
    }

    /// Sends a PING command to the server.
    ///
    /// # Returns
    ///
    /// Returns `PONG` if successful.
    pub async fn ping(&self) -> Result<String> {
        self.string(&command::ping()).await
    }

    /// Loads the hash at `key` into a new `T`.
    ///
    /// # Errors
    ///
    /// [`Error::Nil`] when the hash does not exist.
    #[instrument(skip_all, level = "debug")]
    pub async fn hgetall_to_struct<T: RedisFields>(&self, key: impl Into<Arg>) -> Result<T> {
        marshal::scan_struct(self.query(&command::hgetall(key)).await)
    }

    /// Loads the named hash fields into a new `T`. An empty `fields` slice
    /// requests every tagged field of `T`.
    ///
    /// Fields missing from the hash keep their default value. `HMGET` answers
    /// a missing key with all nils, so a missing hash also yields
    /// `T::default()`; use [`hmget_existing_to_struct`](Self::hmget_existing_to_struct)
    /// to tell the two apart.
    #[instrument(skip_all, level = "debug")]
    pub async fn hmget_to_struct<T: RedisFields>(
        &self,
        key: impl Into<Arg>,
        fields: &[&str],
    ) -> Result<T> {
        let (names, values) = self.hmget_values::<T>(key, fields).await?;
        let mut dest = T::default();
        marshal::scan_fields(&values, &names, &mut dest)?;
        Ok(dest)
    }

    /// Like [`hmget_to_struct`](Self::hmget_to_struct), but fails with
    /// [`Error::Nil`] when none of the requested fields exist.
    #[instrument(skip_all, level = "debug")]
    pub async fn hmget_existing_to_struct<T: RedisFields>(
        &self,
        key: impl Into<Arg>,
        fields: &[&str],
    ) -> Result<T> {
        let (names, values) = self.hmget_values::<T>(key, fields).await?;
        if values.iter().all(Frame::is_nil) {
            return Err(Error::Nil);
        }
        let mut dest = T::default();
        marshal::scan_fields(&values, &names, &mut dest)?;
        Ok(dest)
    }

    async fn hmget_values<'a, T: RedisFields>(
        &self,
        key: impl Into<Arg>,
        fields: &[&'a str],
    ) -> Result<(Vec<&'a str>, Vec<Frame>)> {
        let names: Vec<&'a str> = if fields.is_empty() {
            T::field_table().tags().collect()
        } else {
            fields.to_vec()
        };
        if names.is_empty() {
            return Err(Error::InvalidArgument {
                message: "no fields to fetch".to_string(),
            });
        }

        let values = reply::values(
            self.query(&command::hmget(key, names.iter().copied()))
                .await,
        )?;
        Ok((names, values))
    }

    /// Writes the tagged fields of `object` (or the pairs of a map) to the
    /// hash at `key` with `HMSET`.
    #[instrument(skip_all, level = "debug")]
    pub async fn hmset_object<F: Flatten + ?Sized>(
        &self,
        key: impl Into<Arg>,
        object: &F,
    ) -> Result<String> {
        self.string(&command::hmset(key, object)).await
    }

    /// Closes the pool. Commands issued afterwards fail with
    /// [`Error::PoolClosed`].
    pub fn close(&self) {
        self.pool.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dialer::{Dialer, DialerConfig};
    use crate::core::pool::{PoolConfig, PoolStats};
    use crate::testing::MockServer;

    #[derive(Debug, Default, PartialEq)]
    struct Item {
        field1: String,
        field2: i64,
    }

    crate::redis_fields!(Item {
        field1 => "field1",
        field2 => "field2",
    });

    async fn client() -> (Client, MockServer) {
        let server = MockServer::store().await;
        let client = Client::open(server.address()).unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_client_ping() {
        let (client, _server) = client().await;
        assert_eq!(client.ping().await.unwrap(), "PONG");
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (client, _server) = client().await;
        let reply = client
            .query(&Cmd::new("SET").arg("k").arg("v"))
            .await
            .unwrap();
        assert_eq!(reply, Frame::status("OK"));
        assert_eq!(client.string(&Cmd::new("GET").arg("k")).await.unwrap(), "v");
    }

    #[tokio::test]
    async fn test_missing_key_is_nil() {
        let (client, _server) = client().await;
        let err = client.string(&Cmd::new("GET").arg("absent")).await.unwrap_err();
        assert!(err.is_nil());
        assert_eq!(client.pool().stats(), PoolStats { active: 1, idle: 1 });
    }

    #[tokio::test]
    async fn test_server_error_keeps_connection() {
        let (client, server) = client().await;
        let err = client.int64(&Cmd::new("NOPE")).await.unwrap_err();
        assert!(matches!(err, Error::Server { .. }));
        client.ping().await.unwrap();
        assert_eq!(server.accepted(), 1);
    }

    #[tokio::test]
    async fn test_hash_struct_round_trip() {
        let (client, _server) = client().await;
        let item = Item {
            field1: "hello".to_string(),
            field2: 42,
        };
        assert_eq!(client.hmset_object("obj", &item).await.unwrap(), "OK");

        let loaded: Item = client.hgetall_to_struct("obj").await.unwrap();
        assert_eq!(loaded, item);

        let partial: Item = client.hmget_to_struct("obj", &["field2"]).await.unwrap();
        assert_eq!(
            partial,
            Item {
                field1: String::new(),
                field2: 42,
            }
        );

        let all: Item = client.hmget_to_struct("obj", &[]).await.unwrap();
        assert_eq!(all, item);

        let map = client
            .string_map(&command::hgetall("obj"))
            .await
            .unwrap();
        assert_eq!(map["field2"], "42");
    }

    #[tokio::test]
    async fn test_hgetall_missing_hash_is_nil() {
        let (client, _server) = client().await;
        let err = client.hgetall_to_struct::<Item>("nothing").await.unwrap_err();
        assert!(err.is_nil());
    }

    #[tokio::test]
    async fn test_hmget_missing_hash() {
        let (client, _server) = client().await;
        let loaded: Item = client.hmget_to_struct("nothing", &[]).await.unwrap();
        assert_eq!(loaded, Item::default());

        let err = client
            .hmget_existing_to_struct::<Item>("nothing", &[])
            .await
            .unwrap_err();
        assert!(err.is_nil());

        client.hmset_object("obj", &[("field2", "7")][..]).await.unwrap();
        let loaded: Item = client
            .hmget_existing_to_struct("obj", &["field1", "field2"])
            .await
            .unwrap();
        assert_eq!(loaded.field2, 7);
    }

    #[tokio::test]
    async fn test_closed_client() {
        let server = MockServer::store().await;
        let pool = Pool::new(
            PoolConfig::default(),
            Dialer::new(DialerConfig::new(server.address())),
        );
        let client = Client::with_pool(pool);
        client.ping().await.unwrap();
        client.close();
        assert!(matches!(client.ping().await, Err(Error::PoolClosed)));
    }
}
