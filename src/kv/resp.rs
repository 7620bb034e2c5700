//! RESP2 (REdis Serialization Protocol) codec used by the Redis client.

use crate::core::{Result, ShardError};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Default maximum reply size: 64MB
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Upper bound on array length accepted from the server
const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// RESP data type
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string: +OK\r\n
    SimpleString(Bytes),
    /// Error: -ERR message\r\n
    Error(Bytes),
    /// Integer: :123\r\n
    Integer(i64),
    /// Bulk string: $5\r\nhello\r\n
    BulkString(Option<Bytes>),
    /// Array: *2\r\n$3\r\nGET\r\n$3\r\nkey\r\n
    Array(Vec<RespValue>),
    /// Null: $-1\r\n or *-1\r\n
    Null,
}

impl RespValue {
    /// Builds a command array of bulk strings
    pub fn command<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        RespValue::Array(
            args.into_iter()
                .map(|arg| RespValue::BulkString(Some(Bytes::copy_from_slice(arg.as_ref()))))
                .collect(),
        )
    }

    /// Encode into `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => {
                buf.put_u8(b'+');
                buf.put_slice(s);
                buf.put_slice(b"\r\n");
            }
            RespValue::Error(e) => {
                buf.put_u8(b'-');
                buf.put_slice(e);
                buf.put_slice(b"\r\n");
            }
            RespValue::Integer(i) => {
                buf.put_slice(format!(":{}\r\n", i).as_bytes());
            }
            RespValue::BulkString(Some(bytes)) => {
                buf.put_slice(format!("${}\r\n", bytes.len()).as_bytes());
                buf.put_slice(bytes);
                buf.put_slice(b"\r\n");
            }
            RespValue::BulkString(None) | RespValue::Null => {
                buf.put_slice(b"$-1\r\n");
            }
            RespValue::Array(items) => {
                buf.put_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.encode(buf);
                }
            }
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null | RespValue::BulkString(None))
    }

    /// Turns an error reply into `ShardError::Store`.
    pub fn into_result(self) -> Result<RespValue> {
        match self {
            RespValue::Error(msg) => Err(ShardError::Store(
                String::from_utf8_lossy(&msg).into_owned(),
            )),
            other => Ok(other),
        }
    }

    pub fn into_integer(self) -> Result<i64> {
        match self.into_result()? {
            RespValue::Integer(i) => Ok(i),
            other => Err(unexpected("integer", &other)),
        }
    }

    /// Accepts `+OK`
    pub fn into_ok(self) -> Result<()> {
        match self.into_result()? {
            RespValue::SimpleString(s) if s.as_ref() == b"OK" => Ok(()),
            other => Err(unexpected("OK", &other)),
        }
    }

    pub fn into_opt_string(self) -> Result<Option<String>> {
        match self.into_result()? {
            RespValue::Null | RespValue::BulkString(None) => Ok(None),
            RespValue::BulkString(Some(b)) | RespValue::SimpleString(b) => {
                Ok(Some(String::from_utf8_lossy(&b).into_owned()))
            }
            RespValue::Integer(i) => Ok(Some(i.to_string())),
            other => Err(unexpected("string", &other)),
        }
    }

    pub fn into_opt_string_vec(self) -> Result<Vec<Option<String>>> {
        match self.into_result()? {
            RespValue::Array(items) => items.into_iter().map(RespValue::into_opt_string).collect(),
            RespValue::Null => Ok(Vec::new()),
            other => Err(unexpected("array", &other)),
        }
    }

    /// Array of strings with nil entries dropped
    pub fn into_string_vec(self) -> Result<Vec<String>> {
        Ok(self.into_opt_string_vec()?.into_iter().flatten().collect())
    }
}

fn unexpected(expected: &str, got: &RespValue) -> ShardError {
    ShardError::Protocol(format!("expected {} reply, got {:?}", expected, got))
}

fn protocol(msg: impl Into<String>) -> ShardError {
    ShardError::Protocol(msg.into())
}

/// Tracks how many bytes one reply has consumed
struct FrameBudget {
    used: usize,
    max: usize,
}

impl FrameBudget {
    fn charge(&mut self, bytes: usize) -> Result<()> {
        self.used = self.used.saturating_add(bytes);
        if self.used > self.max {
            return Err(protocol(format!(
                "frame too large: {} bytes (max: {} bytes)",
                self.used, self.max
            )));
        }
        Ok(())
    }
}

enum Frame {
    Value(RespValue),
    ArrayHeader(usize),
}

/// Reads one complete RESP value from `reader`.
///
/// Nested arrays are assembled with an explicit stack, so the future stays
/// `Send` and never recurses.
pub async fn read_value<R>(reader: &mut R, max_bytes: usize) -> Result<RespValue>
where
    R: AsyncBufRead + Unpin,
{
    let mut budget = FrameBudget {
        used: 0,
        max: max_bytes,
    };
    let mut open_arrays: Vec<(Vec<RespValue>, usize)> = Vec::new();

    loop {
        let mut value = match read_frame(reader, &mut budget).await? {
            Frame::ArrayHeader(0) => RespValue::Array(Vec::new()),
            Frame::ArrayHeader(len) => {
                open_arrays.push((Vec::with_capacity(len.min(1024)), len));
                continue;
            }
            Frame::Value(value) => value,
        };

        // Fold completed arrays into their parents.
        loop {
            let Some((items, expected)) = open_arrays.last_mut() else {
                return Ok(value);
            };
            items.push(value);
            if items.len() < *expected {
                break;
            }
            let items = open_arrays.pop().map(|(items, _)| items).unwrap_or_default();
            value = RespValue::Array(items);
        }
    }
}

async fn read_line<R>(reader: &mut R, budget: &mut FrameBudget) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = reader.read_until(b'\n', &mut line).await?;
    if read == 0 {
        return Err(ShardError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed by server",
        )));
    }
    budget.charge(read)?;
    if !line.ends_with(b"\r\n") {
        return Err(protocol("line not terminated by CRLF"));
    }
    line.truncate(line.len() - 2);
    if line.is_empty() {
        return Err(protocol("empty line"));
    }
    Ok(line)
}

fn parse_len(digits: &[u8], what: &str) -> Result<i64> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            protocol(format!(
                "invalid {}: {}",
                what,
                String::from_utf8_lossy(digits)
            ))
        })
}

async fn read_frame<R>(reader: &mut R, budget: &mut FrameBudget) -> Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader, budget).await?;
    let body = &line[1..];

    match line[0] {
        b'+' => Ok(Frame::Value(RespValue::SimpleString(Bytes::copy_from_slice(body)))),
        b'-' => Ok(Frame::Value(RespValue::Error(Bytes::copy_from_slice(body)))),
        b':' => Ok(Frame::Value(RespValue::Integer(parse_len(body, "integer")?))),
        b'$' => {
            let len = parse_len(body, "bulk string length")?;
            if len == -1 {
                return Ok(Frame::Value(RespValue::Null));
            }
            if len < 0 {
                return Err(protocol(format!("invalid bulk string length: {}", len)));
            }
            let len = len as usize;
            budget.charge(len + 2)?;

            let mut data = vec![0u8; len + 2];
            reader.read_exact(&mut data).await?;
            if !data.ends_with(b"\r\n") {
                return Err(protocol("expected CRLF after bulk string"));
            }
            data.truncate(len);
            Ok(Frame::Value(RespValue::BulkString(Some(Bytes::from(data)))))
        }
        b'*' => {
            let len = parse_len(body, "array length")?;
            if len == -1 {
                return Ok(Frame::Value(RespValue::Null));
            }
            if len < 0 || len as usize > MAX_ARRAY_LEN {
                return Err(protocol(format!("invalid array length: {}", len)));
            }
            Ok(Frame::ArrayHeader(len as usize))
        }
        other => Err(protocol(format!("invalid RESP type byte: {}", other))),
    }
}
