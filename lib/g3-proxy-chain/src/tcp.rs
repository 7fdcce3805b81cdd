/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;

use log::debug;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

use crate::config::TcpKeepAliveConfig;
use crate::{ChainConfig, ProxyChainError};

fn set_keepalive(stream: &TcpStream, keepalive: &TcpKeepAliveConfig) -> io::Result<()> {
    if keepalive.is_enabled() {
        let setting = TcpKeepalive::new().with_time(keepalive.idle_time());
        SockRef::from(stream).set_tcp_keepalive(&setting)?;
    }
    Ok(())
}

/// Open a raw tcp connection bounded by the configured connect timeout.
///
/// Keepalive and nodelay are applied once the connection is established.
pub async fn tcp_connect(addr: &str, config: &ChainConfig) -> Result<TcpStream, ProxyChainError> {
    let stream = match tokio::time::timeout(config.connect_timeout(), TcpStream::connect(addr)).await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(ProxyChainError::ConnectFailed(addr.to_string(), e)),
        Err(_) => return Err(ProxyChainError::ConnectTimedOut(addr.to_string())),
    };

    stream
        .set_nodelay(true)
        .and_then(|_| set_keepalive(&stream, config.tcp_keepalive()))
        .map_err(|e| ProxyChainError::ConnectFailed(addr.to_string(), e))?;
    debug!("tcp connected to {addr} from {:?}", stream.local_addr().ok());
    Ok(stream)
}
