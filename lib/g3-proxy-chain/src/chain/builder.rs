/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;
use std::sync::Arc;

use log::info;

use super::{ChainDialer, ProxyChain, TunnelSlot};
use crate::hop::{HopConnector, StandardHopConnector};
use crate::tunnel::H2TunnelClient;
use crate::{ChainConfig, ProxyChainError, ProxyNode};

/// The setup phase of a [`ProxyChain`].
///
/// Nodes are appended in hop order. Nothing is dialed until the chain has
/// been frozen by [`build`](Self::build).
#[derive(Default)]
pub struct ProxyChainBuilder {
    config: ChainConfig,
    nodes: Vec<Arc<ProxyNode>>,
    connector: Option<Arc<dyn HopConnector>>,
}

impl ProxyChainBuilder {
    pub fn new(config: ChainConfig) -> Self {
        ProxyChainBuilder {
            config,
            nodes: Vec::new(),
            connector: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ChainConfig) {
        self.config = config;
    }

    #[inline]
    pub fn nodes(&self) -> &[Arc<ProxyNode>] {
        &self.nodes
    }

    /// Replace the [`StandardHopConnector`] used by default.
    pub fn set_connector(&mut self, connector: Arc<dyn HopConnector>) {
        self.connector = Some(connector);
    }

    pub fn add_node(&mut self, node: ProxyNode) {
        self.nodes.push(Arc::new(node));
    }

    pub fn add_nodes<I>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = ProxyNode>,
    {
        self.nodes.extend(nodes.into_iter().map(Arc::new));
    }

    pub fn add_node_str(&mut self, s: &str) -> Result<(), ProxyChainError> {
        let node =
            ProxyNode::from_str(s).map_err(|e| ProxyChainError::InvalidNode(s.to_string(), e))?;
        self.add_node(node);
        Ok(())
    }

    /// Parse and append all of `nodes`.
    ///
    /// Nothing is appended if any of them fails to parse, and the error of
    /// the first failing one is returned.
    pub fn add_node_strs<I, S>(&mut self, nodes: I) -> Result<(), ProxyChainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Vec::new();
        for s in nodes {
            let s = s.as_ref();
            let node = ProxyNode::from_str(s)
                .map_err(|e| ProxyChainError::InvalidNode(s.to_string(), e))?;
            parsed.push(node);
        }
        self.add_nodes(parsed);
        Ok(())
    }

    /// Freeze the chain.
    ///
    /// The first node with http2 transport, if any, becomes the tunnel node.
    /// It is reached through the nodes before it, and every later http2 node
    /// is treated as a plain hop.
    pub fn build(self) -> Result<ProxyChain, ProxyChainError> {
        let connector = match self.connector {
            Some(connector) => connector,
            None => {
                let connector =
                    StandardHopConnector::new().map_err(ProxyChainError::ConnectorSetup)?;
                Arc::new(connector) as Arc<dyn HopConnector>
            }
        };
        let dialer = Arc::new(ChainDialer::new(self.config, connector));
        let nodes: Arc<[Arc<ProxyNode>]> = self.nodes.into();

        let mut tunnel = None;
        if let Some(index) = nodes.iter().position(|node| node.is_tunnel_node()) {
            let node = nodes[index].clone();
            info!("http2 tunnel enabled through node #{index} {node}");
            let client = H2TunnelClient::new(node, nodes[..index].to_vec(), dialer.clone())?;
            tunnel = Some(TunnelSlot { index, client });
        }

        Ok(ProxyChain::new(nodes, dialer, tunnel))
    }
}
