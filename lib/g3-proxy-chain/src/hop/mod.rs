/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Per-hop negotiation.
//!
//! A [`HopConnector`] knows how to finish the handshake with a hop once a
//! byte stream to it exists, and how to ask an established hop to open a
//! tunnel to the next address. The chain only ever drives hops through
//! this trait, so custom protocols can be plugged in with
//! [`ProxyChainBuilder::set_connector`](crate::ProxyChainBuilder::set_connector).

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::{HopProtocol, HopTransport, ProxyNode};

mod http;
mod socks5;
pub(crate) mod tls;

pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

pub type BoxAsyncStream = Box<dyn AsyncStream>;

#[derive(Debug, Error)]
pub enum HopError {
    #[error("io failed: {0:?}")]
    Io(#[from] io::Error),
    #[error("invalid tls server name {0}")]
    InvalidServerName(String),
    #[error("invalid tls config: {0}")]
    TlsConfig(rustls::Error),
    #[error("tls handshake failed: {0:?}")]
    TlsHandshakeFailed(io::Error),
    #[error("remote closed")]
    RemoteClosed,
    #[error("too large response header, should be less than {0}")]
    TooLargeHeader(usize),
    #[error("invalid response: {0}")]
    InvalidResponse(&'static str),
    #[error("unexpected status code {0} {1}")]
    UnexpectedStatusCode(u16, String),
    #[error("invalid target address {0}")]
    InvalidTargetAddr(String),
    #[error("too long username or password")]
    InvalidCredential,
    #[error("no acceptable auth method")]
    NoAuthMethodAvailable,
    #[error("auth failed")]
    AuthFailed,
    #[error("request failed: {0}")]
    RequestFailed(&'static str),
}

#[async_trait]
pub trait HopConnector: Send + Sync {
    /// Negotiate with `node` over `stream`, which is already connected to it.
    ///
    /// The returned stream owns `stream`. On error `stream` is dropped.
    async fn handshake(
        &self,
        node: &ProxyNode,
        stream: BoxAsyncStream,
    ) -> Result<BoxAsyncStream, HopError>;

    /// Negotiate with the shortcut `node` over a tunnel stream ending at it.
    ///
    /// The tunnel is already secured by the shortcut client, so only the
    /// protocol step is left. Defaults to [`HopConnector::handshake`].
    async fn tunnel_handshake(
        &self,
        node: &ProxyNode,
        stream: BoxAsyncStream,
    ) -> Result<BoxAsyncStream, HopError> {
        self.handshake(node, stream).await
    }

    /// Ask `node`, reachable through `stream`, to open a tunnel to `addr`.
    async fn connect(
        &self,
        node: &ProxyNode,
        stream: &mut BoxAsyncStream,
        addr: &str,
    ) -> Result<(), HopError>;
}

/// One layer of a chained connection.
///
/// Each layer owns the stream below it, so dropping the outermost layer
/// closes every hop it was built on.
pub struct HopStream {
    inner: BoxAsyncStream,
    node: Arc<ProxyNode>,
}

impl HopStream {
    pub fn new(inner: BoxAsyncStream, node: Arc<ProxyNode>) -> Self {
        HopStream { inner, node }
    }

    /// The hop this layer talks to.
    #[inline]
    pub fn node(&self) -> &Arc<ProxyNode> {
        &self.node
    }

    pub async fn connect(
        &mut self,
        connector: &dyn HopConnector,
        addr: &str,
    ) -> Result<(), HopError> {
        connector.connect(&self.node, &mut self.inner, addr).await
    }
}

impl AsyncRead for HopStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for HopStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Connector for the built-in http / socks5 protocols over tcp or tls.
pub struct StandardHopConnector {
    tls: tls::TlsClientConfigs,
}

impl StandardHopConnector {
    pub fn new() -> Result<Self, HopError> {
        Ok(StandardHopConnector {
            tls: tls::TlsClientConfigs::new()?,
        })
    }

    async fn negotiate(
        &self,
        node: &ProxyNode,
        mut stream: BoxAsyncStream,
    ) -> Result<BoxAsyncStream, HopError> {
        if node.protocol() == HopProtocol::Socks5 {
            socks5::socks5_login(&mut stream, node.auth()).await?;
        }
        Ok(stream)
    }
}

#[async_trait]
impl HopConnector for StandardHopConnector {
    async fn handshake(
        &self,
        node: &ProxyNode,
        stream: BoxAsyncStream,
    ) -> Result<BoxAsyncStream, HopError> {
        let stream = match node.transport() {
            // an http2 node past the shortcut one is a plain tls hop
            HopTransport::Tls | HopTransport::Http2 => {
                let tls_stream = self.tls.connect(node, stream).await?;
                Box::new(tls_stream) as BoxAsyncStream
            }
            HopTransport::Tcp => stream,
        };
        self.negotiate(node, stream).await
    }

    async fn tunnel_handshake(
        &self,
        node: &ProxyNode,
        stream: BoxAsyncStream,
    ) -> Result<BoxAsyncStream, HopError> {
        self.negotiate(node, stream).await
    }

    async fn connect(
        &self,
        node: &ProxyNode,
        stream: &mut BoxAsyncStream,
        addr: &str,
    ) -> Result<(), HopError> {
        match node.protocol() {
            HopProtocol::Http => http::http_connect_to(stream, node.auth(), addr).await,
            HopProtocol::Socks5 => socks5::socks5_connect_to(stream, addr).await,
        }
    }
}
