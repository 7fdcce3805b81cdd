/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::HopError;
use crate::NodeAuth;

const MAX_RESPONSE_HEADER_SIZE: usize = 4096;

fn build_request(auth: Option<&NodeAuth>, addr: &str) -> String {
    let mut req = format!("CONNECT {addr} HTTP/1.1\r\nHost: {addr}\r\n");
    if let Some(auth) = auth {
        let token = STANDARD.encode(format!("{}:{}", auth.username, auth.password));
        req.push_str(&format!("Proxy-Authorization: Basic {token}\r\n"));
    }
    req.push_str("\r\n");
    req
}

/// Read the response head one byte at a time, so that nothing after the
/// blank line is taken from the tunnel.
async fn recv_response_head<S>(stream: &mut S, max_size: usize) -> Result<Vec<u8>, HopError>
where
    S: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    loop {
        let nr = stream.read(&mut byte).await?;
        if nr == 0 {
            return Err(HopError::RemoteClosed);
        }
        head.push(byte[0]);
        if head.ends_with(b"\r\n\r\n") || head.ends_with(b"\n\n") {
            return Ok(head);
        }
        if head.len() >= max_size {
            return Err(HopError::TooLargeHeader(max_size));
        }
    }
}

fn parse_status_line(head: &[u8]) -> Result<(u16, String), HopError> {
    let end = memchr::memchr(b'\n', head).unwrap_or(head.len());
    let line = std::str::from_utf8(&head[..end])
        .map_err(|_| HopError::InvalidResponse("status line is not valid utf-8"))?
        .trim_end();

    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(HopError::InvalidResponse("invalid http version"));
    }
    let code = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or(HopError::InvalidResponse("invalid status code"))?;
    let reason = parts.next().unwrap_or_default().to_string();
    Ok((code, reason))
}

pub(super) async fn http_connect_to<S>(
    stream: &mut S,
    auth: Option<&NodeAuth>,
    addr: &str,
) -> Result<(), HopError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let req = build_request(auth, addr);
    stream.write_all(req.as_bytes()).await?;
    stream.flush().await?;

    let head = recv_response_head(stream, MAX_RESPONSE_HEADER_SIZE).await?;
    let (code, reason) = parse_status_line(&head)?;
    if code != 200 {
        return Err(HopError::UnexpectedStatusCode(code, reason));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn connect_ok() {
        let mut stream = Builder::new()
            .write(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
            .read(b"HTTP/1.1 200 Connection established\r\nProxy-Agent: test\r\n\r\n")
            .build();
        http_connect_to(&mut stream, None, "example.com:443")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn connect_with_auth() {
        let mut stream = Builder::new()
            .write(
                b"CONNECT 10.0.0.1:22 HTTP/1.1\r\nHost: 10.0.0.1:22\r\n\
                Proxy-Authorization: Basic dXNlcjpwYXNz\r\n\r\n",
            )
            .read(b"HTTP/1.0 200 OK\r\n\r\n")
            .build();
        let auth = NodeAuth {
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        http_connect_to(&mut stream, Some(&auth), "10.0.0.1:22")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn connect_no_over_read() {
        let mut stream = Builder::new()
            .write(b"CONNECT example.com:80 HTTP/1.1\r\nHost: example.com:80\r\n\r\n")
            .read(b"HTTP/1.1 200 OK\r\n\r\nSSH-2.0")
            .build();
        http_connect_to(&mut stream, None, "example.com:80")
            .await
            .unwrap();
        let mut buf = [0u8; 7];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"SSH-2.0");
    }

    #[tokio::test]
    async fn connect_refused() {
        let mut stream = Builder::new()
            .write(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
            .read(b"HTTP/1.1 407 Proxy Authentication Required\r\nContent-Length: 0\r\n\r\n")
            .build();
        let e = http_connect_to(&mut stream, None, "example.com:443")
            .await
            .unwrap_err();
        assert!(matches!(e, HopError::UnexpectedStatusCode(407, ref r) if r == "Proxy Authentication Required"));
    }

    #[tokio::test]
    async fn connect_closed() {
        let mut stream = Builder::new()
            .write(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
            .read(b"HTTP/1.1 200")
            .build();
        let e = http_connect_to(&mut stream, None, "example.com:443")
            .await
            .unwrap_err();
        assert!(matches!(e, HopError::RemoteClosed));
    }

    #[test]
    fn status_line() {
        assert_eq!(
            parse_status_line(b"HTTP/1.1 503 Service Unavailable\r\n\r\n").unwrap(),
            (503, "Service Unavailable".to_string())
        );
        assert_eq!(
            parse_status_line(b"HTTP/1.1 200\r\n\r\n").unwrap(),
            (200, String::new())
        );
        assert!(parse_status_line(b"SSH-2.0-OpenSSH\r\n\r\n").is_err());
        assert!(parse_status_line(b"HTTP/1.1 abc OK\r\n\r\n").is_err());
    }
}
