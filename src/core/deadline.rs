//! Deadline-bound execution of a single command.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::core::command::Cmd;
use crate::core::connection::Connection;
use crate::core::pool::Pool;
use crate::proto::error::Result;
use crate::proto::frame::Frame;

/// Sends `cmd` on `conn` and waits at most `timeout` for the reply.
///
/// The deadline replaces the connection's configured read timeout for this
/// call only. On expiry the call fails with
/// [`Error::Timeout`](crate::proto::error::Error::Timeout) and the connection
/// is marked broken: the late reply may still arrive, so the stream can no
/// longer be matched to requests.
pub async fn send_with_deadline<S>(
    conn: &mut Connection<S>,
    timeout: Duration,
    cmd: &Cmd,
) -> Result<Frame>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    conn.round_trip(cmd, Some(timeout)).await
}

/// Checks a connection out of `pool`, runs `cmd` under `timeout` and
/// returns the connection (or discards it when the deadline hit).
pub async fn do_with_timeout(pool: &Pool, timeout: Duration, cmd: &Cmd) -> Result<Frame> {
    let mut conn = pool.get().await?;
    send_with_deadline(&mut conn, timeout, cmd).await
}
