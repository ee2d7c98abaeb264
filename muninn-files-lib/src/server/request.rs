#![forbid(unsafe_code)]

use std::time::Duration;

use percent_encoding::percent_decode_str;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::RequestError;

/// Upper bound on request head bytes; anything longer is malformed.
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// First line of a request head. The path is percent-decoded with its
/// leading slashes stripped; the query string is still attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub path: String,
    pub protocol: String,
}

impl RequestLine {
    /// Split the first line on single spaces and require exactly three
    /// tokens. Anything else is a malformed request.
    pub fn parse(raw: &str) -> Result<RequestLine, RequestError> {
        let first_line = raw.split("\r\n").next().unwrap_or(raw);
        let mut tokens = first_line.split(' ');
        let (Some(method), Some(path), Some(protocol), None) =
            (tokens.next(), tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(RequestError::Protocol);
        };
        let path = percent_decode_str(path.trim_start_matches('/'))
            .decode_utf8_lossy()
            .into_owned();
        Ok(RequestLine {
            method: method.to_string(),
            path,
            protocol: protocol.to_string(),
        })
    }
}

/// Read the request head from the socket: stop at the blank-line
/// terminator or EOF. `None` means nothing usable arrived before the
/// idle timeout and the connection should be closed without a response.
pub async fn read_request(
    stream: &mut TcpStream,
    idle_timeout: Duration,
) -> Result<Option<String>, RequestError> {
    let mut head = Vec::with_capacity(512);
    let mut chunk = [0u8; 4096];
    loop {
        let n = match timeout(idle_timeout, stream.read(&mut chunk)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(RequestError::Transport(e)),
            Err(_) => return Ok(None),
        };
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
        if find_header_end(&head).is_some() {
            break;
        }
        if head.len() > MAX_REQUEST_BYTES {
            return Err(RequestError::Protocol);
        }
    }
    if head.is_empty() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&head).into_owned()))
}

/// Position just past the `\r\n\r\n` terminator, if present.
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}
