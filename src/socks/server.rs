//! SOCKS5 server subset for dynamic forwarding
//!
//! Implements version 5, no authentication, CONNECT only. The reply byte
//! layout is fixed to a zeroed IPv4 bind address, which is what standard
//! SOCKS5 clients expect from a tunneling proxy.

use crate::error::{BurrowError, Result};
use crate::helper::join_host_port;
use crate::socks::consts::*;
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Send a SOCKS5 reply with the given code and a zeroed IPv4 bind address
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// ```
pub async fn send_reply<S>(stream: &mut S, code: u8) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let reply = [
        SOCKS5_VERSION,
        code,
        SOCKS5_RESERVED,
        SOCKS5_ADDR_TYPE_IPV4,
        0,
        0,
        0,
        0,
        0,
        0,
    ];
    stream.write_all(&reply).await?;
    stream.flush().await
}

/// Negotiate no-auth and read a CONNECT request, returning the target as
/// `host:port`
///
/// Protocol violations that the state machine can still answer (unsupported
/// command or address type) are replied to before the error is returned;
/// the caller only has to close the connection.
pub async fn accept_connect<S>(stream: &mut S) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Method negotiation: VER NMETHODS METHODS...
    let mut greeting = [0u8; 2];
    stream.read_exact(&mut greeting).await?;

    if greeting[0] != SOCKS5_VERSION {
        return Err(BurrowError::Protocol(format!(
            "unsupported SOCKS version: {}",
            greeting[0]
        )));
    }

    let mut methods = vec![0u8; greeting[1] as usize];
    stream.read_exact(&mut methods).await?;

    stream
        .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE])
        .await?;
    stream.flush().await?;

    // Request: VER CMD RSV ATYP DST.ADDR DST.PORT
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;

    if header[0] != SOCKS5_VERSION || header[1] != SOCKS5_CMD_TCP_CONNECT {
        send_reply(stream, SOCKS5_REPLY_COMMAND_NOT_SUPPORTED).await?;
        return Err(BurrowError::Protocol(format!(
            "unsupported SOCKS command: {}",
            header[1]
        )));
    }

    let host = match header[3] {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            Ipv4Addr::from(addr).to_string()
        }
        SOCKS5_ADDR_TYPE_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut domain = vec![0u8; len[0] as usize];
            stream.read_exact(&mut domain).await?;
            String::from_utf8_lossy(&domain).into_owned()
        }
        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            Ipv6Addr::from(addr).to_string()
        }
        other => {
            send_reply(stream, SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED).await?;
            return Err(BurrowError::Protocol(format!(
                "unsupported SOCKS address type: {}",
                other
            )));
        }
    };

    let mut port = [0u8; 2];
    stream.read_exact(&mut port).await?;
    let port = u16::from_be_bytes(port);

    Ok(join_host_port(&host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    async fn drive(client_bytes: Vec<u8>) -> (Result<String>, Vec<u8>) {
        let (mut client, mut server) = duplex(1024);

        let handle = tokio::spawn(async move { accept_connect(&mut server).await });

        client.write_all(&client_bytes).await.unwrap();
        client.shutdown().await.unwrap();

        let result = handle.await.unwrap();

        let mut replies = Vec::new();
        client.read_to_end(&mut replies).await.unwrap();
        (result, replies)
    }

    fn greeting() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE]
    }

    #[tokio::test]
    async fn test_connect_ipv4() {
        let mut bytes = greeting();
        bytes.extend_from_slice(&[
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_IPV4,
            127,
            0,
            0,
            1,
            0x00,
            0x50,
        ]);

        let (result, replies) = drive(bytes).await;
        assert_eq!(result.unwrap(), "127.0.0.1:80");
        // Only the method selection has been written at this point
        assert_eq!(replies, vec![SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE]);
    }

    #[tokio::test]
    async fn test_connect_domain() {
        let mut bytes = greeting();
        bytes.extend_from_slice(&[
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            11,
        ]);
        bytes.extend_from_slice(b"example.com");
        bytes.extend_from_slice(&[0x01, 0xBB]);

        let (result, _) = drive(bytes).await;
        assert_eq!(result.unwrap(), "example.com:443");
    }

    #[tokio::test]
    async fn test_connect_ipv6() {
        let mut bytes = greeting();
        bytes.extend_from_slice(&[
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_IPV6,
        ]);
        bytes.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        bytes.extend_from_slice(&[0x00, 0x16]);

        let (result, _) = drive(bytes).await;
        assert_eq!(result.unwrap(), "[::1]:22");
    }

    #[tokio::test]
    async fn test_unsupported_command_reply() {
        let mut bytes = greeting();
        bytes.extend_from_slice(&[
            SOCKS5_VERSION,
            0x02, // BIND
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_IPV4,
            0,
            0,
            0,
            0,
            0,
            0,
        ]);

        let (result, replies) = drive(bytes).await;
        assert!(result.is_err());
        assert_eq!(
            &replies[2..],
            &[
                SOCKS5_VERSION,
                SOCKS5_REPLY_COMMAND_NOT_SUPPORTED,
                0x00,
                0x01,
                0,
                0,
                0,
                0,
                0,
                0
            ]
        );
    }

    #[tokio::test]
    async fn test_unsupported_address_type_reply() {
        let mut bytes = greeting();
        bytes.extend_from_slice(&[
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            0x02, // not a valid ATYP
        ]);

        let (result, replies) = drive(bytes).await;
        assert!(result.is_err());
        assert_eq!(
            &replies[2..],
            &[
                SOCKS5_VERSION,
                SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED,
                0x00,
                0x01,
                0,
                0,
                0,
                0,
                0,
                0
            ]
        );
    }

    #[tokio::test]
    async fn test_rejects_socks4() {
        let (result, replies) = drive(vec![0x04, 0x01]).await;
        assert!(result.is_err());
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_reply_bytes() {
        let mut buffer = Vec::new();
        send_reply(&mut buffer, SOCKS5_REPLY_GENERAL_FAILURE)
            .await
            .unwrap();
        assert_eq!(buffer, vec![0x05, 0x01, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
    }
}
