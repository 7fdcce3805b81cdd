/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::IpAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::HopError;
use crate::NodeAuth;

const SOCKS5_VERSION: u8 = 0x05;
const AUTH_METHOD_NONE: u8 = 0x00;
const AUTH_METHOD_USER: u8 = 0x02;
const USER_AUTH_VERSION: u8 = 0x01;
const CMD_TCP_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

fn reply_message(code: u8) -> &'static str {
    match code {
        0x01 => "general socks server failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "ttl expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unassigned reply code",
    }
}

fn split_host_port(addr: &str) -> Option<(&str, u16)> {
    let (host, port) = addr.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some((host, port))
    }
}

fn encode_connect_request(addr: &str) -> Result<Vec<u8>, HopError> {
    let (host, port) =
        split_host_port(addr).ok_or_else(|| HopError::InvalidTargetAddr(addr.to_string()))?;

    let mut buf = Vec::with_capacity(22);
    buf.extend_from_slice(&[SOCKS5_VERSION, CMD_TCP_CONNECT, 0x00]);
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip4)) => {
            buf.push(ATYP_IPV4);
            buf.extend_from_slice(&ip4.octets());
        }
        Ok(IpAddr::V6(ip6)) => {
            buf.push(ATYP_IPV6);
            buf.extend_from_slice(&ip6.octets());
        }
        Err(_) => {
            let len = u8::try_from(host.len())
                .map_err(|_| HopError::InvalidTargetAddr(addr.to_string()))?;
            buf.push(ATYP_DOMAIN);
            buf.push(len);
            buf.extend_from_slice(host.as_bytes());
        }
    }
    buf.extend_from_slice(&port.to_be_bytes());
    Ok(buf)
}

async fn proceed_with_user<S>(stream: &mut S, auth: &NodeAuth) -> Result<(), HopError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ulen = u8::try_from(auth.username.len()).map_err(|_| HopError::InvalidCredential)?;
    let plen = u8::try_from(auth.password.len()).map_err(|_| HopError::InvalidCredential)?;

    let mut buf = Vec::with_capacity(3 + auth.username.len() + auth.password.len());
    buf.push(USER_AUTH_VERSION);
    buf.push(ulen);
    buf.extend_from_slice(auth.username.as_bytes());
    buf.push(plen);
    buf.extend_from_slice(auth.password.as_bytes());
    stream.write_all(&buf).await?;
    stream.flush().await?;

    let mut rsp = [0u8; 2];
    stream.read_exact(&mut rsp).await?;
    if rsp[1] != 0x00 {
        return Err(HopError::AuthFailed);
    }
    Ok(())
}

/// Method negotiation, and user/password auth if the server selects it.
pub(super) async fn socks5_login<S>(stream: &mut S, auth: Option<&NodeAuth>) -> Result<(), HopError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let req: &[u8] = if auth.is_some() {
        &[SOCKS5_VERSION, 0x02, AUTH_METHOD_NONE, AUTH_METHOD_USER]
    } else {
        &[SOCKS5_VERSION, 0x01, AUTH_METHOD_NONE]
    };
    stream.write_all(req).await?;
    stream.flush().await?;

    let mut rsp = [0u8; 2];
    stream.read_exact(&mut rsp).await?;
    if rsp[0] != SOCKS5_VERSION {
        return Err(HopError::InvalidResponse("invalid socks version"));
    }
    match (rsp[1], auth) {
        (AUTH_METHOD_NONE, _) => Ok(()),
        (AUTH_METHOD_USER, Some(auth)) => proceed_with_user(stream, auth).await,
        _ => Err(HopError::NoAuthMethodAvailable),
    }
}

pub(super) async fn socks5_connect_to<S>(stream: &mut S, addr: &str) -> Result<(), HopError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let req = encode_connect_request(addr)?;
    stream.write_all(&req).await?;
    stream.flush().await?;

    let mut hdr = [0u8; 4];
    stream.read_exact(&mut hdr).await?;
    if hdr[0] != SOCKS5_VERSION {
        return Err(HopError::InvalidResponse("invalid socks version"));
    }
    if hdr[1] != 0x00 {
        return Err(HopError::RequestFailed(reply_message(hdr[1])));
    }

    // the bound address is of no use to us, but must be drained
    let addr_len = match hdr[3] {
        ATYP_IPV4 => 4,
        ATYP_IPV6 => 16,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            len[0] as usize
        }
        _ => return Err(HopError::InvalidResponse("invalid address type")),
    };
    let mut bound = vec![0u8; addr_len + 2];
    stream.read_exact(&mut bound).await?;
    Ok(())
}
