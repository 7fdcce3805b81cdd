/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use log::debug;

use crate::hop::{BoxAsyncStream, HopConnector, HopStream};
use crate::tunnel::H2TunnelClient;
use crate::{ChainConfig, ProxyChainError, ProxyNode, tcp_connect};

type DialFuture<'a> = Pin<Box<dyn Future<Output = Result<BoxAsyncStream, ProxyChainError>> + Send + 'a>>;

/// Builds layered connections over a list of nodes.
pub(crate) struct ChainDialer {
    config: ChainConfig,
    connector: Arc<dyn HopConnector>,
}

impl ChainDialer {
    pub(crate) fn new(config: ChainConfig, connector: Arc<dyn HopConnector>) -> Self {
        ChainDialer { config, connector }
    }

    #[inline]
    pub(crate) fn config(&self) -> &ChainConfig {
        &self.config
    }

    #[inline]
    pub(crate) fn connector(&self) -> &dyn HopConnector {
        self.connector.as_ref()
    }

    async fn open_first_hop(
        &self,
        node: &ProxyNode,
        tunnel: Option<&H2TunnelClient>,
    ) -> Result<BoxAsyncStream, ProxyChainError> {
        match tunnel {
            Some(tunnel) => {
                let stream = tunnel.open_tunnel_to_target(node.addr()).await?;
                Ok(Box::new(stream))
            }
            None => {
                let stream = tcp_connect(node.addr(), &self.config).await?;
                Ok(Box::new(stream))
            }
        }
    }

    /// Handshake with every node in order, each on top of the previous one.
    ///
    /// The first node is reached through `tunnel` if set, or by a raw dial.
    /// On error every layer built so far is dropped before returning.
    pub(crate) async fn travel_nodes(
        &self,
        nodes: &[Arc<ProxyNode>],
        tunnel: Option<&H2TunnelClient>,
    ) -> Result<HopStream, ProxyChainError> {
        let Some((first, rest)) = nodes.split_first() else {
            return Err(ProxyChainError::EmptyChain);
        };

        let stream = self.open_first_hop(first, tunnel).await?;
        let stream = self
            .connector
            .handshake(first, stream)
            .await
            .map_err(|e| ProxyChainError::HandshakeFailed {
                node: first.to_string(),
                source: e,
            })?;
        debug!("handshake with node {first} done");
        let mut hop = HopStream::new(stream, first.clone());

        for node in rest {
            hop.connect(self.connector(), node.addr())
                .await
                .map_err(|e| ProxyChainError::HopConnectFailed {
                    node: hop.node().to_string(),
                    addr: node.addr().to_string(),
                    source: e,
                })?;
            debug!("node {} connected to {}", hop.node(), node.addr());

            let stream = self
                .connector
                .handshake(node, Box::new(hop))
                .await
                .map_err(|e| ProxyChainError::HandshakeFailed {
                    node: node.to_string(),
                    source: e,
                })?;
            debug!("handshake with node {node} done");
            hop = HopStream::new(stream, node.clone());
        }
        Ok(hop)
    }

    /// Reach `addr` through `nodes`, or directly if there is none.
    ///
    /// With `tunnel` set and no node left, the shortcut node itself connects
    /// to `addr`.
    pub(crate) async fn dial_through(
        &self,
        addr: &str,
        nodes: &[Arc<ProxyNode>],
        tunnel: Option<&H2TunnelClient>,
    ) -> Result<BoxAsyncStream, ProxyChainError> {
        if nodes.is_empty() {
            return match tunnel {
                Some(tunnel) => {
                    let stream = tunnel.open_tunnel_to_target(addr).await?;
                    Ok(Box::new(stream))
                }
                None => {
                    let stream = tcp_connect(addr, &self.config).await?;
                    Ok(Box::new(stream))
                }
            };
        }

        let mut hop = self.travel_nodes(nodes, tunnel).await?;
        hop.connect(self.connector(), addr)
            .await
            .map_err(|e| ProxyChainError::HopConnectFailed {
                node: hop.node().to_string(),
                addr: addr.to_string(),
                source: e,
            })?;
        debug!("chain of {} nodes connected to {addr}", nodes.len());
        Ok(Box::new(hop))
    }

    /// Reach `addr` through `prefix` using raw dials only.
    ///
    /// Used by the tunnel client to reach the shortcut node.
    pub(crate) fn dial_prefix<'a>(
        &'a self,
        addr: &'a str,
        prefix: &'a [Arc<ProxyNode>],
    ) -> DialFuture<'a> {
        Box::pin(self.dial_through(addr, prefix, None))
    }
}
