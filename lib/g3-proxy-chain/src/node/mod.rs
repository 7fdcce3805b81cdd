/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;

mod parse;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HopProtocol {
    Http,
    Socks5,
}

impl HopProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            HopProtocol::Http => "http",
            HopProtocol::Socks5 => "socks5",
        }
    }
}

/// How the byte stream to a hop is carried.
///
/// `Http2` marks the hop that may be reached through a multiplexed
/// HTTP/2 CONNECT stream instead of a raw connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HopTransport {
    Tcp,
    Tls,
    Http2,
}

impl HopTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            HopTransport::Tcp => "tcp",
            HopTransport::Tls => "tls",
            HopTransport::Http2 => "http2",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeAuth {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProxyNode {
    addr: String,
    protocol: HopProtocol,
    transport: HopTransport,
    auth: Option<NodeAuth>,
    tls_insecure: bool,
    tls_server_name: Option<String>,
}

impl ProxyNode {
    /// `addr` should be in `host:port` form, with ipv6 hosts in brackets.
    pub fn new(addr: impl Into<String>, protocol: HopProtocol, transport: HopTransport) -> Self {
        ProxyNode {
            addr: addr.into(),
            protocol,
            transport,
            auth: None,
            tls_insecure: false,
            tls_server_name: None,
        }
    }

    #[must_use]
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.auth = Some(NodeAuth {
            username: username.to_string(),
            password: password.to_string(),
        });
        self
    }

    #[must_use]
    pub fn with_tls_insecure(mut self, insecure: bool) -> Self {
        self.tls_insecure = insecure;
        self
    }

    #[must_use]
    pub fn with_tls_server_name(mut self, name: &str) -> Self {
        self.tls_server_name = Some(name.to_string());
        self
    }

    #[inline]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    #[inline]
    pub fn protocol(&self) -> HopProtocol {
        self.protocol
    }

    #[inline]
    pub fn transport(&self) -> HopTransport {
        self.transport
    }

    #[inline]
    pub fn auth(&self) -> Option<&NodeAuth> {
        self.auth.as_ref()
    }

    #[inline]
    pub fn tls_insecure(&self) -> bool {
        self.tls_insecure
    }

    #[inline]
    pub fn is_tunnel_node(&self) -> bool {
        self.transport == HopTransport::Http2
    }

    /// The explicit server name, or the host part of the node address.
    pub fn tls_server_name(&self) -> &str {
        match &self.tls_server_name {
            Some(name) => name,
            None => host_part(&self.addr),
        }
    }
}

impl fmt::Display for ProxyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.transport == HopTransport::Tcp {
            write!(f, "{}://{}", self.protocol.as_str(), self.addr)
        } else {
            write!(
                f,
                "{}+{}://{}",
                self.protocol.as_str(),
                self.transport.as_str(),
                self.addr
            )
        }
    }
}

fn host_part(addr: &str) -> &str {
    if let Some(s) = addr.strip_prefix('[') {
        return match s.find(']') {
            Some(p) => &s[..p],
            None => s,
        };
    }
    match addr.rfind(':') {
        Some(p) => &addr[..p],
        None => addr,
    }
}
