//! HTTP client adapter (C8): the minimal raw-socket HTTP/1.1 client used
//! by the remote [`crate::location::Location`] variant.
//!
//! The server (C7) speaks raw sockets rather than embedding a framework,
//! so the client mirrors that here instead of pulling in an HTTP client
//! crate: one small, shared request/response primitive used by every
//! remote operation.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

use crate::error::{Error, Result};

/// A parsed HTTP response with headers already read and the body still
/// sitting unread on the underlying stream, so large bodies (the hash
/// stream, block data) can be consumed without buffering them twice.
pub struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub reader: BufReader<TcpStream>,
}

/// Issues a single HTTP/1.1 request and returns the response with its
/// status line and headers parsed. `path_and_query` must already include
/// a leading `/` and any query string.
pub fn request(
    host: &str,
    port: u16,
    method: &str,
    path_and_query: &str,
    body: Option<&[u8]>,
) -> Result<RawResponse> {
    let stream = TcpStream::connect((host, port))
        .map_err(|e| Error::remote(format!("connecting to {host}:{port}: {e}")))?;
    let mut writer = stream
        .try_clone()
        .map_err(|e| Error::remote(format!("cloning connection to {host}:{port}: {e}")))?;

    let mut head = format!("{method} {path_and_query} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n");
    if let Some(body) = body {
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    head.push_str("\r\n");

    writer
        .write_all(head.as_bytes())
        .map_err(|e| Error::remote(format!("writing request to {host}:{port}: {e}")))?;
    if let Some(body) = body {
        writer
            .write_all(body)
            .map_err(|e| Error::remote(format!("writing request body to {host}:{port}: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| Error::remote(format!("flushing request to {host}:{port}: {e}")))?;

    let mut reader = BufReader::new(stream);
    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .map_err(|e| Error::remote(format!("reading response from {host}:{port}: {e}")))?;
    if status_line.is_empty() {
        return Err(Error::remote(format!("{host}:{port} closed the connection with no response")));
    }
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| Error::remote(format!("malformed status line: {status_line:?}")))?;

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .map_err(|e| Error::remote(format!("reading headers from {host}:{port}: {e}")))?;
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    Ok(RawResponse { status, headers, reader })
}

impl RawResponse {
    /// The `Content-Length` header value, or 0 if absent.
    pub fn content_length(&self) -> usize {
        self.headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Reads exactly `Content-Length` bytes as the body.
    pub fn read_body(mut self) -> Result<Vec<u8>> {
        let len = self.content_length();
        let mut buf = vec![0u8; len];
        self.reader
            .read_exact(&mut buf)
            .map_err(|e| Error::remote(format!("reading response body: {e}")))?;
        Ok(buf)
    }

    /// Fails with [`Error::Remote`] unless the status is 2xx.
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if (200..300).contains(&self.status) {
            Ok(())
        } else {
            Err(Error::remote(format!(
                "{context}: server returned status {}",
                self.status
            )))
        }
    }
}

/// Percent-encodes a query-string value. Only the characters that would
/// otherwise be ambiguous in a query string are escaped.
pub fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_query_value_escapes_reserved_bytes() {
        assert_eq!(encode_query_value("/tmp/a b.bin"), "%2Ftmp%2Fa%20b.bin");
        assert_eq!(encode_query_value("plain-name_1.0"), "plain-name_1.0");
    }
}
