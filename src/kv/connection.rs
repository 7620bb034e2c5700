use super::config::RedisConfig;
use super::resp::{DEFAULT_MAX_FRAME_SIZE, RespValue, read_value};
use crate::core::{Result, ShardError};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;

/// A single RESP connection: one request, one reply, no pipelining.
pub struct RespConnection<S> {
    stream: BufStream<S>,
    write_buf: BytesMut,
    max_frame: usize,
}

impl<S> RespConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
            write_buf: BytesMut::with_capacity(256),
            max_frame: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Sends one command and waits for its reply.
    ///
    /// Error replies come back as `RespValue::Error`; only transport and
    /// framing failures are returned as `Err`.
    pub async fn call<I, A>(&mut self, args: I) -> Result<RespValue>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.write_buf.clear();
        RespValue::command(args).encode(&mut self.write_buf);
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;
        read_value(&mut self.stream, self.max_frame).await
    }
}

impl RespConnection<TcpStream> {
    /// Dials the server, then authenticates and selects the database.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let unreachable = |reason: String| ShardError::Unreachable {
            addr: config.host.clone(),
            reason,
        };

        let stream = tokio::time::timeout(
            config.connect_timeout_duration(),
            TcpStream::connect(&config.host),
        )
        .await
        .map_err(|_| unreachable("connect timed out".to_string()))?
        .map_err(|e| unreachable(e.to_string()))?;
        stream.set_nodelay(true)?;

        let mut connection = Self::new(stream);
        if !config.password.is_empty() {
            connection
                .call(["AUTH", config.password.as_str()])
                .await?
                .into_ok()?;
        }
        if config.db != 0 {
            let db = config.db.to_string();
            connection.call(["SELECT", db.as_str()]).await?.into_ok()?;
        }
        Ok(connection)
    }
}
