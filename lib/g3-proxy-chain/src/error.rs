/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;

use thiserror::Error;

use crate::hop::HopError;

#[derive(Debug, Error)]
pub enum NodeParseError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported scheme {0}")]
    UnsupportedScheme(String),
    #[error("no host found")]
    NoHostFound,
    #[error("invalid percent encoded auth: {0}")]
    InvalidAuth(std::str::Utf8Error),
    #[error("invalid value for query key {0}")]
    InvalidQueryValue(String),
}

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("invalid tls config: {0}")]
    TlsConfig(HopError),
    #[error("failed to reach tunnel node: {0}")]
    DialFailed(Box<ProxyChainError>),
    #[error("tls handshake with tunnel node failed: {0:?}")]
    TlsHandshakeFailed(io::Error),
    #[error("h2 handshake failed: {0}")]
    H2HandshakeFailed(h2::Error),
    #[error("failed to open h2 stream: {0}")]
    StreamOpenFailed(h2::Error),
    #[error("failed to build switch request: {0}")]
    InvalidRequest(#[from] http::Error),
    #[error("failed to send switch request: {0}")]
    SendRequestFailed(h2::Error),
    #[error("failed to recv switch response: {0}")]
    RecvResponseFailed(h2::Error),
    #[error("{0}")]
    UnexpectedStatus(String),
}

#[derive(Debug, Error)]
pub enum ProxyChainError {
    #[error("empty chain")]
    EmptyChain,
    #[error("failed to setup hop connector: {0}")]
    ConnectorSetup(HopError),
    #[error("invalid node {0}: {1}")]
    InvalidNode(String, NodeParseError),
    #[error("timed out to connect to {0}")]
    ConnectTimedOut(String),
    #[error("connect to {0} failed: {1:?}")]
    ConnectFailed(String, io::Error),
    #[error("handshake with node {node} failed: {source}")]
    HandshakeFailed { node: String, source: HopError },
    #[error("node {node} failed to connect to {addr}: {source}")]
    HopConnectFailed {
        node: String,
        addr: String,
        source: HopError,
    },
    #[error("tunnel error: {0}")]
    Tunnel(#[from] TunnelError),
}
