//! Minimal memcached text-protocol client.
//!
//! Only `set` is implemented:
//!
//! ```text
//! set <key> <flags> <exptime> <bytes>\r\n<data>\r\n   ->   STORED\r\n
//! ```
//!
//! Connections are pooled so concurrent workers writing to the same server do
//! not serialize on a single socket. A connection that saw an IO error or a
//! timeout is dropped instead of returned to the pool.

use snafu::prelude::*;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{
    ConnectSnafu, InvalidKeySnafu, IoSnafu, RejectedSnafu, StoreError, TimeoutSnafu,
    ValueTooLargeSnafu,
};

/// Longest key memcached accepts.
pub const MAX_KEY_LEN: usize = 250;

type Connection = BufStream<TcpStream>;

/// Tuning for a memcached client.
#[derive(Debug, Clone)]
pub struct MemcacheOptions {
    /// Timeout for connecting and for each request/response exchange.
    pub timeout: Duration,
    /// Idle connections kept for reuse.
    pub max_idle_connections: usize,
    /// Largest value accepted before sending.
    pub max_value_bytes: usize,
}

impl Default for MemcacheOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            max_idle_connections: 8,
            max_value_bytes: 1024 * 1024,
        }
    }
}

/// Client for a single memcached server.
pub struct MemcacheClient {
    addr: String,
    options: MemcacheOptions,
    idle: Mutex<Vec<Connection>>,
}

impl MemcacheClient {
    /// Create a client. No connection is opened until the first write.
    pub fn new(addr: impl Into<String>, options: MemcacheOptions) -> Self {
        Self {
            addr: addr.into(),
            options,
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Store `value` under `key` with no flags and no expiry.
    pub async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        ensure!(is_valid_key(key), InvalidKeySnafu { key });
        ensure!(
            value.len() <= self.options.max_value_bytes,
            ValueTooLargeSnafu {
                size: value.len(),
                limit: self.options.max_value_bytes,
            }
        );

        let mut conn = self.checkout().await?;
        let reply = tokio::time::timeout(self.options.timeout, send_set(&mut conn, key, value))
            .await
            .map_err(|_| {
                TimeoutSnafu {
                    addr: self.addr.clone(),
                }
                .build()
            })?
            .context(IoSnafu {
                addr: self.addr.clone(),
            })?;

        // Only a STORED reply proves the stream is still in sync.
        if reply == "STORED" {
            self.checkin(conn).await;
        }

        ensure!(
            reply == "STORED",
            RejectedSnafu {
                addr: self.addr.clone(),
                reply,
            }
        );
        Ok(())
    }

    async fn checkout(&self) -> Result<Connection, StoreError> {
        if let Some(conn) = self.idle.lock().await.pop() {
            return Ok(conn);
        }

        debug!("Opening memcached connection to {}", self.addr);
        let stream = tokio::time::timeout(self.options.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                TimeoutSnafu {
                    addr: self.addr.clone(),
                }
                .build()
            })?
            .context(ConnectSnafu {
                addr: self.addr.clone(),
            })?;
        stream.set_nodelay(true).context(ConnectSnafu {
            addr: self.addr.clone(),
        })?;
        Ok(BufStream::new(stream))
    }

    async fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock().await;
        if idle.len() < self.options.max_idle_connections {
            idle.push(conn);
        }
    }
}

async fn send_set(conn: &mut Connection, key: &str, value: &[u8]) -> std::io::Result<String> {
    let header = format!("set {key} 0 0 {}\r\n", value.len());
    conn.write_all(header.as_bytes()).await?;
    conn.write_all(value).await?;
    conn.write_all(b"\r\n").await?;
    conn.flush().await?;

    let mut line = String::new();
    if conn.read_line(&mut line).await? == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed before reply",
        ));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Keys must be 1..=250 bytes with no whitespace or control characters.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.len() <= MAX_KEY_LEN && key.bytes().all(|b| b > b' ' && b != 0x7f)
}
