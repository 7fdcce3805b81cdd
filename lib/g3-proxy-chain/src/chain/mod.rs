/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::borrow::Cow;
use std::net::Ipv6Addr;
use std::sync::Arc;

use crate::hop::BoxAsyncStream;
use crate::tunnel::H2TunnelClient;
use crate::{ChainConfig, ProxyChainError, ProxyNode};

mod builder;
pub use builder::ProxyChainBuilder;

mod engine;
pub(crate) use engine::ChainDialer;

const DEFAULT_TARGET_PORT: u16 = 80;

fn with_default_port(addr: &str) -> Cow<'_, str> {
    if addr.starts_with('[') {
        if addr.ends_with(']') {
            return Cow::Owned(format!("{addr}:{DEFAULT_TARGET_PORT}"));
        }
        return Cow::Borrowed(addr);
    }
    if addr.parse::<Ipv6Addr>().is_ok() {
        return Cow::Owned(format!("[{addr}]:{DEFAULT_TARGET_PORT}"));
    }
    if addr.contains(':') {
        Cow::Borrowed(addr)
    } else {
        Cow::Owned(format!("{addr}:{DEFAULT_TARGET_PORT}"))
    }
}

struct TunnelSlot {
    index: usize,
    client: H2TunnelClient,
}

/// A frozen proxy chain.
///
/// Built by [`ProxyChainBuilder::build`]. It can be shared between tasks,
/// every call to [`dial`](Self::dial) or [`get_conn`](Self::get_conn)
/// builds a new connection through all hops.
pub struct ProxyChain {
    nodes: Arc<[Arc<ProxyNode>]>,
    last_node: Option<Arc<ProxyNode>>,
    dialer: Arc<ChainDialer>,
    tunnel: Option<TunnelSlot>,
}

impl ProxyChain {
    fn new(
        nodes: Arc<[Arc<ProxyNode>]>,
        dialer: Arc<ChainDialer>,
        tunnel: Option<TunnelSlot>,
    ) -> Self {
        let last_node = nodes.last().cloned();
        ProxyChain {
            nodes,
            last_node,
            dialer,
            tunnel,
        }
    }

    #[inline]
    pub fn nodes(&self) -> &[Arc<ProxyNode>] {
        &self.nodes
    }

    #[inline]
    pub fn last_node(&self) -> Option<&Arc<ProxyNode>> {
        self.last_node.as_ref()
    }

    #[inline]
    pub fn config(&self) -> &ChainConfig {
        self.dialer.config()
    }

    #[inline]
    pub fn tunnel_enabled(&self) -> bool {
        self.tunnel.is_some()
    }

    pub fn tunnel_node_index(&self) -> Option<usize> {
        self.tunnel.as_ref().map(|slot| slot.index)
    }

    pub fn tunnel_node(&self) -> Option<&Arc<ProxyNode>> {
        self.tunnel.as_ref().map(|slot| slot.client.node())
    }

    /// Connect to `addr` through every node of the chain.
    ///
    /// Port 80 is used if `addr` has none. With no node at all the target
    /// is dialed directly.
    pub async fn dial(&self, addr: &str) -> Result<BoxAsyncStream, ProxyChainError> {
        let addr = with_default_port(addr);
        match &self.tunnel {
            Some(slot) => {
                let rest = &self.nodes[slot.index + 1..];
                self.dialer
                    .dial_through(&addr, rest, Some(&slot.client))
                    .await
            }
            None => self.dialer.dial_through(&addr, &self.nodes, None).await,
        }
    }

    /// Connect to the last node of the chain, without any further target.
    pub async fn get_conn(&self) -> Result<BoxAsyncStream, ProxyChainError> {
        if self.nodes.is_empty() {
            return Err(ProxyChainError::EmptyChain);
        }

        match &self.tunnel {
            Some(slot) => {
                let rest = &self.nodes[slot.index + 1..];
                if rest.is_empty() {
                    let stream = slot.client.open_tunnel_stream().await?;
                    return Ok(Box::new(stream));
                }
                let hop = self.dialer.travel_nodes(rest, Some(&slot.client)).await?;
                Ok(Box::new(hop))
            }
            None => {
                let hop = self.dialer.travel_nodes(&self.nodes, None).await?;
                Ok(Box::new(hop))
            }
        }
    }
}
