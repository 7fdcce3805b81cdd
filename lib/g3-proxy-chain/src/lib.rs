/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Outbound connections through an ordered list of proxy hops.
//!
//! A [`ProxyChainBuilder`] collects the hops and is frozen into a
//! [`ProxyChain`] by [`ProxyChainBuilder::build`], which also decides
//! whether the head of the chain can be collapsed into a single HTTP/2
//! CONNECT stream. The frozen chain is then shared by all callers of
//! [`ProxyChain::dial`] and [`ProxyChain::get_conn`].

mod error;
pub use error::{NodeParseError, ProxyChainError, TunnelError};

mod node;
pub use node::{HopProtocol, HopTransport, NodeAuth, ProxyNode};

mod config;
pub use config::{ChainConfig, TcpKeepAliveConfig};
#[cfg(feature = "yaml")]
pub use config::load_yaml_file;

mod tcp;
pub use tcp::tcp_connect;

pub mod hop;
pub use hop::{AsyncStream, BoxAsyncStream, HopConnector, HopError, HopStream};

mod tunnel;
pub use tunnel::{PROXY_SWITCH_HEADER, PROXY_SWITCH_TOKEN, TunnelStream};

mod chain;
pub use chain::{ProxyChain, ProxyChainBuilder};
