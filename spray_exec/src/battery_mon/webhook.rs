//! Minimal HTTP client for the critical battery alert.
//!
//! Only plain `http://` endpoints are supported. The request is a single JSON `POST` with
//! `Connection: close`, and only the status line of the response is read.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::debug;
use serde::Serialize;
use std::{
    io::{self, BufRead, BufReader, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A parsed `http://host[:port]/path` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,

    pub port: u16,

    pub path: String,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Only http:// URLs are supported, got {0:?}")]
    UnsupportedScheme(String),

    #[error("Invalid URL {0:?}")]
    InvalidUrl(String),

    #[error("Could not resolve {0}")]
    ResolveFailed(String),

    #[error("Could not serialise the payload: {0}")]
    SerialiseError(#[from] serde_json::Error),

    #[error("Connection error: {0}")]
    IoError(#[from] io::Error),

    #[error("Malformed response status line {0:?}")]
    BadResponse(String),

    #[error("Server responded with status {0}")]
    Status(u16),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Endpoint {
    pub fn parse(url: &str) -> Result<Self, WebhookError> {
        let rest = url
            .strip_prefix("http://")
            .ok_or_else(|| WebhookError::UnsupportedScheme(url.to_string()))?;

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => (
                h,
                p.parse::<u16>()
                    .map_err(|_| WebhookError::InvalidUrl(url.to_string()))?,
            ),
            None => (authority, 80),
        };

        if host.is_empty() {
            return Err(WebhookError::InvalidUrl(url.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    fn addr(&self) -> Result<SocketAddr, WebhookError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| WebhookError::ResolveFailed(format!("{}:{}", self.host, self.port)))
    }
}

/// POST `payload` as JSON to `url`, returning the response status code.
///
/// `timeout` bounds the connection and each read or write on it.
pub fn post_json<T: Serialize>(
    url: &str,
    payload: &T,
    timeout: Duration,
) -> Result<u16, WebhookError> {
    let endpoint = Endpoint::parse(url)?;
    let body = serde_json::to_string(payload)?;

    let timeout = timeout.max(Duration::from_millis(1));
    let mut stream = TcpStream::connect_timeout(&endpoint.addr()?, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    let request = format!(
        "POST {} HTTP/1.1\r\nHost: {}:{}\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        endpoint.path,
        endpoint.host,
        endpoint.port,
        body.len(),
        body
    );
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let mut status_line = String::new();
    BufReader::new(stream).read_line(&mut status_line)?;
    let code = parse_status_line(&status_line)?;

    debug!("Webhook {} answered {}", url, code);

    if (200..300).contains(&code) {
        Ok(code)
    } else {
        Err(WebhookError::Status(code))
    }
}

fn parse_status_line(line: &str) -> Result<u16, WebhookError> {
    let mut parts = line.split_whitespace();

    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse()
            .map_err(|_| WebhookError::BadResponse(line.trim_end().to_string())),
        _ => Err(WebhookError::BadResponse(line.trim_end().to_string())),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
