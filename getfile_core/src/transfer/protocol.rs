use std::borrow::Cow;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::constants::MAX_REQUEST_LINE;
use crate::error::{SessionError, WaitPoint};

/// Command token opening every request line
pub const GET_COMMAND: &[u8; 4] = b"GET ";

/// Positive acknowledgment (5 bytes)
pub const OK_TOKEN: &[u8; 5] = b"+OK\r\n";

/// Negative acknowledgment (6 bytes); the requester reads it as 5 + 1
pub const ERR_TOKEN: &[u8; 6] = b"-ERR\r\n";

/// Bytes the requester reads before classifying a response
pub const ACK_PREFIX_LEN: usize = 5;

/// Acknowledgment sent by the responder after validating a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckTag {
    Positive,
    Negative,
}

impl AckTag {
    pub const fn wire_bytes(self) -> &'static [u8] {
        match self {
            AckTag::Positive => OK_TOKEN,
            AckTag::Negative => ERR_TOKEN,
        }
    }

    /// Classify the first five bytes of a response
    pub fn classify(prefix: &[u8; ACK_PREFIX_LEN]) -> Option<AckTag> {
        if prefix == OK_TOKEN {
            Some(AckTag::Positive)
        } else if prefix[..] == ERR_TOKEN[..ACK_PREFIX_LEN] {
            Some(AckTag::Negative)
        } else {
            None
        }
    }
}

/// A single file request.
///
/// The filename is an arbitrary byte string; only CR and LF are excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub filename: Vec<u8>,
}

impl Request {
    /// Build a request, refusing names that would break the line framing
    pub fn new(filename: impl Into<Vec<u8>>) -> Result<Self, SessionError> {
        let filename = filename.into();
        if filename.is_empty() {
            return Err(SessionError::InvalidRequest("empty filename".to_string()));
        }
        if filename.iter().any(|&b| b == b'\r' || b == b'\n') {
            return Err(SessionError::InvalidRequest(format!(
                "filename contains a line terminator: {:?}",
                String::from_utf8_lossy(&filename)
            )));
        }
        Ok(Self { filename })
    }

    /// Filename for logs and events; invalid UTF-8 is replaced
    pub fn display_name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.filename)
    }

    /// `GET <filename>\r\n`
    pub fn encode(&self) -> Vec<u8> {
        let mut line = Vec::with_capacity(GET_COMMAND.len() + self.filename.len() + 2);
        line.extend_from_slice(GET_COMMAND);
        line.extend_from_slice(&self.filename);
        line.extend_from_slice(b"\r\n");
        line
    }
}

/// What the responder found at the start of the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestLine {
    Get(Request),
    /// Anything that is not a well-formed `GET` line
    BadCommand(String),
    /// Peer closed the stream before sending anything
    Closed,
}

/// Run an I/O future bounded by `timeout`, mapping expiry to a timeout at `phase`.
pub async fn io_within<F, T>(timeout: Duration, phase: WaitPoint, fut: F) -> Result<T, SessionError>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Err(SessionError::PeerClosed),
        Ok(Err(e)) => Err(SessionError::Io(e)),
        Err(_) => Err(SessionError::Timeout { phase, timeout }),
    }
}

/// Read a big-endian `u32`
pub async fn read_u32_within<R>(
    reader: &mut R,
    timeout: Duration,
    phase: WaitPoint,
) -> Result<u32, SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut word = [0u8; 4];
    io_within(timeout, phase, reader.read_exact(&mut word)).await?;
    Ok(u32::from_be_bytes(word))
}

/// Write a big-endian `u32`
pub async fn write_u32<W>(writer: &mut W, value: u32) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&value.to_be_bytes()).await
}

pub async fn write_ack<W>(writer: &mut W, tag: AckTag) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(tag.wire_bytes()).await?;
    writer.flush().await
}

/// Read and decode the responder's acknowledgment.
///
/// A negative acknowledgment is only accepted once its trailing `\n` has been read.
pub async fn read_ack<R>(reader: &mut R, timeout: Duration) -> Result<AckTag, SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; ACK_PREFIX_LEN];
    io_within(timeout, WaitPoint::Ack, reader.read_exact(&mut prefix)).await?;

    match AckTag::classify(&prefix) {
        Some(AckTag::Positive) => Ok(AckTag::Positive),
        Some(AckTag::Negative) => {
            let mut confirm = [0u8; 1];
            io_within(timeout, WaitPoint::Ack, reader.read_exact(&mut confirm)).await?;
            if confirm[0] != ERR_TOKEN[ACK_PREFIX_LEN] {
                return Err(SessionError::ProtocolViolation(format!(
                    "negative acknowledgment terminated by {:#04x}",
                    confirm[0]
                )));
            }
            Ok(AckTag::Negative)
        }
        None => Err(SessionError::ProtocolViolation(format!(
            "invalid response {:?}",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

/// Send a request line
pub async fn write_request<W>(writer: &mut W, request: &Request) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&request.encode()).await?;
    writer.flush().await
}

/// Read the command token and the rest of the request line.
///
/// Both reads are bounded by `timeout`.
pub async fn read_request_line<R>(
    reader: &mut R,
    timeout: Duration,
) -> Result<RequestLine, SessionError>
where
    R: AsyncBufRead + Unpin,
{
    let mut command = [0u8; GET_COMMAND.len()];
    let mut filled = 0;
    while filled < command.len() {
        let n = io_within(
            timeout,
            WaitPoint::RequestLine,
            reader.read(&mut command[filled..]),
        )
        .await?;
        if n == 0 {
            if filled == 0 {
                return Ok(RequestLine::Closed);
            }
            return Ok(RequestLine::BadCommand(format!(
                "truncated command {:?}",
                String::from_utf8_lossy(&command[..filled])
            )));
        }
        filled += n;
    }

    if &command != GET_COMMAND {
        return Ok(RequestLine::BadCommand(format!(
            "illegal command {:?}",
            String::from_utf8_lossy(&command)
        )));
    }

    let mut line = Vec::with_capacity(64);
    let limit = (MAX_REQUEST_LINE - GET_COMMAND.len()) as u64;
    io_within(
        timeout,
        WaitPoint::RequestLine,
        (&mut *reader).take(limit).read_until(b'\n', &mut line),
    )
    .await?;

    if line.last() != Some(&b'\n') {
        return Ok(RequestLine::BadCommand(
            "request line missing terminator or too long".to_string(),
        ));
    }

    let end = line
        .iter()
        .position(|&b| b == b'\r')
        .unwrap_or(line.len() - 1);
    line.truncate(end);
    if line.is_empty() {
        return Ok(RequestLine::BadCommand("empty filename".to_string()));
    }
    Ok(RequestLine::Get(Request { filename: line }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(1);

    #[test]
    fn test_token_lengths() {
        assert_eq!(AckTag::Positive.wire_bytes().len(), 5);
        assert_eq!(AckTag::Negative.wire_bytes().len(), 6);
    }

    #[test]
    fn test_classify() {
        assert_eq!(AckTag::classify(b"+OK\r\n"), Some(AckTag::Positive));
        assert_eq!(AckTag::classify(b"-ERR\r"), Some(AckTag::Negative));
        assert_eq!(AckTag::classify(b"+OK\n\r"), None);
        assert_eq!(AckTag::classify(b"HELLO"), None);
    }

    #[test]
    fn test_request_encoding() {
        let request = Request::new("dir/file.txt").unwrap();
        assert_eq!(request.encode(), b"GET dir/file.txt\r\n".to_vec());
    }

    #[test]
    fn test_request_rejects_framing_breakers() {
        assert!(Request::new("").is_err());
        assert!(Request::new("a\r\nGET b").is_err());
        assert!(Request::new("a\n").is_err());
        assert!(Request::new(b"caf\xe9".to_vec()).is_ok());
    }

    #[tokio::test]
    async fn test_read_ack_positive() {
        let mut input: &[u8] = b"+OK\r\n\x00\x00\x00\x05";
        assert_eq!(read_ack(&mut input, T).await.unwrap(), AckTag::Positive);
        // Only the token is consumed
        assert_eq!(input.len(), 4);
    }

    #[tokio::test]
    async fn test_read_ack_negative_consumes_terminator() {
        let mut input: &[u8] = b"-ERR\r\n";
        assert_eq!(read_ack(&mut input, T).await.unwrap(), AckTag::Negative);
        assert!(input.is_empty());
    }

    #[tokio::test]
    async fn test_read_ack_negative_bad_terminator() {
        let mut input: &[u8] = b"-ERR\rX";
        let err = read_ack(&mut input, T).await.unwrap_err();
        assert!(matches!(err, SessionError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_read_ack_garbage() {
        let mut input: &[u8] = b"HTTP/1.1 200";
        let err = read_ack(&mut input, T).await.unwrap_err();
        assert!(matches!(err, SessionError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_read_ack_short_stream() {
        let mut input: &[u8] = b"+OK";
        let err = read_ack(&mut input, T).await.unwrap_err();
        assert!(matches!(err, SessionError::PeerClosed));
    }

    #[tokio::test]
    async fn test_read_request_line() {
        let mut input: &[u8] = b"GET a/b/c.txt\r\nGET next\r\n";
        assert_eq!(
            read_request_line(&mut input, T).await.unwrap(),
            RequestLine::Get(Request {
                filename: b"a/b/c.txt".to_vec()
            })
        );
        assert_eq!(
            read_request_line(&mut input, T).await.unwrap(),
            RequestLine::Get(Request {
                filename: b"next".to_vec()
            })
        );
        assert_eq!(
            read_request_line(&mut input, T).await.unwrap(),
            RequestLine::Closed
        );
    }

    #[tokio::test]
    async fn test_read_request_line_keeps_raw_bytes() {
        let mut input: &[u8] = b"GET dir/caf\xe9.txt\r\n";
        assert_eq!(
            read_request_line(&mut input, T).await.unwrap(),
            RequestLine::Get(Request {
                filename: b"dir/caf\xe9.txt".to_vec()
            })
        );

        let mut empty: &[u8] = b"GET \r\n";
        assert!(matches!(
            read_request_line(&mut empty, T).await.unwrap(),
            RequestLine::BadCommand(_)
        ));
    }

    #[tokio::test]
    async fn test_read_request_line_bad_command() {
        let mut input: &[u8] = b"PUT x\r\n";
        assert!(matches!(
            read_request_line(&mut input, T).await.unwrap(),
            RequestLine::BadCommand(_)
        ));

        let mut truncated: &[u8] = b"GE";
        assert!(matches!(
            read_request_line(&mut truncated, T).await.unwrap(),
            RequestLine::BadCommand(_)
        ));
    }

    #[tokio::test]
    async fn test_read_request_line_unterminated() {
        let mut input: &[u8] = b"GET file-without-end";
        assert!(matches!(
            read_request_line(&mut input, T).await.unwrap(),
            RequestLine::BadCommand(_)
        ));
    }

    #[tokio::test]
    async fn test_read_request_line_too_long() {
        let mut raw = b"GET ".to_vec();
        raw.extend(std::iter::repeat_n(b'a', MAX_REQUEST_LINE));
        raw.extend_from_slice(b"\r\n");
        let mut input: &[u8] = &raw;
        assert!(matches!(
            read_request_line(&mut input, T).await.unwrap(),
            RequestLine::BadCommand(_)
        ));
    }

    #[tokio::test]
    async fn test_read_u32_big_endian() {
        let mut input: &[u8] = &[0x00, 0x01, 0x02, 0x03];
        let value = read_u32_within(&mut input, T, WaitPoint::SizeHeader)
            .await
            .unwrap();
        assert_eq!(value, 0x0001_0203);
    }
}
