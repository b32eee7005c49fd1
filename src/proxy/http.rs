//! HTTP CONNECT client handshake
//!
//! Establishes a raw tunnel through an HTTP proxy. The `https` proxy scheme
//! is handled identically; TLS towards the proxy itself is not spoken, which
//! matches what most local forward proxies accept.

use crate::error::{BurrowError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Perform a CONNECT handshake for `target` (a `host:port` string)
///
/// The stream must be buffered so that header lines can be consumed without
/// eating into tunneled bytes. Remaining response headers are drained on both
/// the success and the failure path; a non-200 status line is returned
/// verbatim inside the error.
pub async fn connect<S>(stream: &mut S, target: &str, auth: Option<(&str, &str)>) -> Result<()>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    let mut request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n", target, target);
    if let Some((username, password)) = auth {
        let token = BASE64.encode(format!("{}:{}", username, password));
        request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", token));
    }
    request.push_str("Connection: keep-alive\r\n\r\n");

    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let mut status = String::new();
    stream.read_line(&mut status).await?;
    if status.is_empty() {
        return Err(BurrowError::Protocol(
            "proxy closed connection before answering CONNECT".to_string(),
        ));
    }

    let ok = status.starts_with("HTTP/1.1 200") || status.starts_with("HTTP/1.0 200");

    // Drain the remaining header lines up to the blank separator either way
    loop {
        let mut line = String::new();
        let n = stream.read_line(&mut line).await?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    if !ok {
        return Err(BurrowError::Connect(format!(
            "proxy CONNECT failed: {}",
            status.trim()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, BufReader};

    async fn run_connect(
        response: &'static str,
        auth: Option<(&'static str, &'static str)>,
    ) -> (Result<()>, String) {
        let (client, mut server) = duplex(4096);
        let mut client = BufReader::new(client);

        let handle =
            tokio::spawn(async move { connect(&mut client, "example.com:22", auth).await });

        // Read the request up to the blank line, then answer
        let mut request = vec![0u8; 4096];
        let mut len = 0;
        while !request[..len].windows(4).any(|w| w == b"\r\n\r\n") {
            len += server.read(&mut request[len..]).await.unwrap();
        }
        server.write_all(response.as_bytes()).await.unwrap();

        let result = handle.await.unwrap();
        (result, String::from_utf8(request[..len].to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_connect_success() {
        let (result, request) =
            run_connect("HTTP/1.1 200 Connection established\r\n\r\n", None).await;
        assert!(result.is_ok());
        assert!(request.starts_with("CONNECT example.com:22 HTTP/1.1\r\n"));
        assert!(request.contains("Host: example.com:22\r\n"));
        assert!(!request.contains("Proxy-Authorization"));
    }

    #[tokio::test]
    async fn test_connect_sends_basic_auth() {
        let (result, request) = run_connect(
            "HTTP/1.0 200 OK\r\nX-Filler: yes\r\n\r\n",
            Some(("user", "pass")),
        )
        .await;
        assert!(result.is_ok());
        // base64("user:pass")
        assert!(request.contains("Proxy-Authorization: Basic dXNlcjpwYXNz\r\n"));
    }

    #[tokio::test]
    async fn test_connect_failure_carries_status_line() {
        let (result, _) = run_connect(
            "HTTP/1.1 407 Proxy Authentication Required\r\nProxy-Authenticate: Basic\r\n\r\n",
            None,
        )
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, BurrowError::Connect(_)));
        assert!(format!("{}", err).contains("407 Proxy Authentication Required"));
    }

    #[tokio::test]
    async fn test_connect_empty_response() {
        let (client, mut server) = duplex(4096);
        let mut client = BufReader::new(client);
        // EOF instead of a status line
        tokio::io::AsyncWriteExt::shutdown(&mut server).await.unwrap();

        let result = connect(&mut client, "example.com:22", None).await;
        assert!(matches!(result.unwrap_err(), BurrowError::Protocol(_)));
    }
}
