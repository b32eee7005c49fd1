//! SOCKS5 client handshake for proxy chaining
//!
//! Speaks just enough of the client side of RFC 1928/1929 to tunnel the SSH
//! connection through an upstream SOCKS5 proxy: method negotiation with
//! optional username/password, then a single CONNECT request.

use crate::error::{BurrowError, Result};
use crate::socks::consts::*;
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Perform a SOCKS5 CONNECT handshake over an established proxy connection
///
/// On success the stream is a raw tunnel to `target_host:target_port`.
pub async fn connect<S>(
    stream: &mut S,
    target_host: &str,
    target_port: u16,
    auth: Option<(&str, &str)>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Method negotiation; offer username/password only when credentials
    // are configured.
    let greeting: &[u8] = if auth.is_some() {
        &[
            SOCKS5_VERSION,
            2,
            SOCKS5_AUTH_METHOD_NONE,
            SOCKS5_AUTH_METHOD_PASSWORD,
        ]
    } else {
        &[SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE]
    };
    stream.write_all(greeting).await?;
    stream.flush().await?;

    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice[0] != SOCKS5_VERSION {
        return Err(BurrowError::Protocol(format!(
            "proxy answered with SOCKS version {}",
            choice[0]
        )));
    }

    match choice[1] {
        SOCKS5_AUTH_METHOD_NONE => {}
        SOCKS5_AUTH_METHOD_PASSWORD => {
            let (username, password) = auth.ok_or_else(|| {
                BurrowError::Protocol("proxy requires authentication".to_string())
            })?;
            negotiate_password(stream, username, password).await?;
        }
        other => {
            return Err(BurrowError::Protocol(format!(
                "proxy selected unsupported auth method: {:#04x}",
                other
            )));
        }
    }

    // CONNECT request
    let mut request = vec![SOCKS5_VERSION, SOCKS5_CMD_TCP_CONNECT, SOCKS5_RESERVED];
    if let Ok(ip) = target_host.parse::<Ipv4Addr>() {
        request.push(SOCKS5_ADDR_TYPE_IPV4);
        request.extend_from_slice(&ip.octets());
    } else if let Ok(ip) = target_host.parse::<Ipv6Addr>() {
        request.push(SOCKS5_ADDR_TYPE_IPV6);
        request.extend_from_slice(&ip.octets());
    } else {
        if target_host.len() > MAX_DOMAIN_LEN {
            return Err(BurrowError::config(format!(
                "target host too long for SOCKS5: {}",
                target_host
            )));
        }
        request.push(SOCKS5_ADDR_TYPE_DOMAIN);
        request.push(target_host.len() as u8);
        request.extend_from_slice(target_host.as_bytes());
    }
    request.extend_from_slice(&target_port.to_be_bytes());

    stream.write_all(&request).await?;
    stream.flush().await?;

    // Reply: VER REP RSV ATYP BND.ADDR BND.PORT
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    if header[0] != SOCKS5_VERSION {
        return Err(BurrowError::Protocol(format!(
            "proxy answered with SOCKS version {}",
            header[0]
        )));
    }
    if header[1] != SOCKS5_REPLY_SUCCEEDED {
        return Err(BurrowError::Connect(format!(
            "proxy CONNECT failed: {}",
            reply_message(header[1])
        )));
    }

    // Drain the bound address so the stream is positioned at tunnel data
    match header[3] {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut skip = [0u8; 4 + 2];
            stream.read_exact(&mut skip).await?;
        }
        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut skip = [0u8; 16 + 2];
            stream.read_exact(&mut skip).await?;
        }
        SOCKS5_ADDR_TYPE_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut skip = vec![0u8; len[0] as usize + 2];
            stream.read_exact(&mut skip).await?;
        }
        other => {
            return Err(BurrowError::Protocol(format!(
                "proxy reply with unsupported address type: {}",
                other
            )));
        }
    }

    Ok(())
}

/// RFC 1929 username/password sub-negotiation
async fn negotiate_password<S>(stream: &mut S, username: &str, password: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if username.len() > 255 || password.len() > 255 {
        return Err(BurrowError::config(
            "proxy username/password longer than 255 bytes",
        ));
    }

    let mut msg = vec![SOCKS5_AUTH_VERSION, username.len() as u8];
    msg.extend_from_slice(username.as_bytes());
    msg.push(password.len() as u8);
    msg.extend_from_slice(password.as_bytes());
    stream.write_all(&msg).await?;
    stream.flush().await?;

    let mut status = [0u8; 2];
    stream.read_exact(&mut status).await?;
    if status[1] != 0x00 {
        return Err(BurrowError::Connect(
            "proxy rejected username/password".to_string(),
        ));
    }
    Ok(())
}

fn reply_message(code: u8) -> &'static str {
    match code {
        0x01 => "general SOCKS server failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown reply code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    /// Script the proxy side of the exchange: read what the client sends,
    /// assert the prefix, answer with the canned replies.
    async fn run_client(
        server_script: Vec<Vec<u8>>,
        auth: Option<(&'static str, &'static str)>,
    ) -> (Result<()>, Vec<u8>) {
        let (mut client, mut server) = duplex(1024);

        let handle =
            tokio::spawn(async move { connect(&mut client, "example.com", 443, auth).await });

        for reply in server_script {
            server.write_all(&reply).await.unwrap();
        }
        server.flush().await.unwrap();

        let result = handle.await.unwrap();

        // Collect everything the client wrote
        let mut sent = Vec::new();
        server.shutdown().await.unwrap();
        let _ = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            server.read_to_end(&mut sent),
        )
        .await;
        (result, sent)
    }

    #[tokio::test]
    async fn test_connect_no_auth() {
        let script = vec![
            vec![0x05, 0x00],
            vec![0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0],
        ];
        let (result, sent) = run_client(script, None).await;
        assert!(result.is_ok());

        // Greeting offers only the no-auth method
        assert_eq!(&sent[..3], &[0x05, 0x01, 0x00]);
        // CONNECT request with domain address
        assert_eq!(&sent[3..7], &[0x05, 0x01, 0x00, 0x03]);
        assert_eq!(sent[7], 11);
        assert_eq!(&sent[8..19], b"example.com");
        assert_eq!(&sent[19..21], &443u16.to_be_bytes());
    }

    #[tokio::test]
    async fn test_connect_with_password_auth() {
        let script = vec![
            vec![0x05, 0x02],
            vec![0x01, 0x00],
            vec![0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0],
        ];
        let (result, sent) = run_client(script, Some(("user", "pass"))).await;
        assert!(result.is_ok());

        // Greeting offers no-auth and username/password
        assert_eq!(&sent[..4], &[0x05, 0x02, 0x00, 0x02]);
        // RFC 1929 sub-negotiation
        assert_eq!(sent[4], 0x01);
        assert_eq!(sent[5], 4);
        assert_eq!(&sent[6..10], b"user");
        assert_eq!(sent[10], 4);
        assert_eq!(&sent[11..15], b"pass");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let script = vec![
            vec![0x05, 0x00],
            vec![0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0],
        ];
        let (result, _) = run_client(script, None).await;
        let err = result.unwrap_err();
        assert!(matches!(err, BurrowError::Connect(_)));
        assert!(format!("{}", err).contains("connection refused"));
    }

    #[tokio::test]
    async fn test_no_acceptable_method() {
        let script = vec![vec![0x05, 0xFF]];
        let (result, _) = run_client(script, None).await;
        assert!(matches!(result.unwrap_err(), BurrowError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_auth_rejected() {
        let script = vec![vec![0x05, 0x02], vec![0x01, 0x01]];
        let (result, _) = run_client(script, Some(("user", "bad"))).await;
        assert!(matches!(result.unwrap_err(), BurrowError::Connect(_)));
    }
}
