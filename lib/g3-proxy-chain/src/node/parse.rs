/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;

use percent_encoding::percent_decode_str;
use url::Url;

use super::{HopProtocol, HopTransport, NodeAuth, ProxyNode};
use crate::NodeParseError;

fn parse_scheme(scheme: &str) -> Result<(HopProtocol, HopTransport), NodeParseError> {
    let (protocol, transport) = match scheme.split_once('+') {
        Some((p, t)) => (p, Some(t)),
        None => match scheme {
            "https" | "tls" => ("http", Some("tls")),
            "http2" => ("http", Some("http2")),
            _ => (scheme, None),
        },
    };

    let protocol = match protocol {
        "http" => HopProtocol::Http,
        "socks" | "socks5" => HopProtocol::Socks5,
        _ => return Err(NodeParseError::UnsupportedScheme(scheme.to_string())),
    };
    let transport = match transport {
        None | Some("tcp") => HopTransport::Tcp,
        Some("tls") => HopTransport::Tls,
        Some("http2") => HopTransport::Http2,
        Some(_) => return Err(NodeParseError::UnsupportedScheme(scheme.to_string())),
    };
    Ok((protocol, transport))
}

fn default_port(protocol: HopProtocol, transport: HopTransport) -> u16 {
    match (protocol, transport) {
        (_, HopTransport::Tls | HopTransport::Http2) => 443,
        (HopProtocol::Socks5, HopTransport::Tcp) => 1080,
        (HopProtocol::Http, HopTransport::Tcp) => 80,
    }
}

fn parse_bool(k: &str, v: &str) -> Result<bool, NodeParseError> {
    match v.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(NodeParseError::InvalidQueryValue(k.to_string())),
    }
}

fn decode(s: &str) -> Result<String, NodeParseError> {
    percent_decode_str(s)
        .decode_utf8()
        .map(|v| v.into_owned())
        .map_err(NodeParseError::InvalidAuth)
}

impl TryFrom<&Url> for ProxyNode {
    type Error = NodeParseError;

    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        let (protocol, transport) = parse_scheme(&url.scheme().to_ascii_lowercase())?;

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h,
            _ => return Err(NodeParseError::NoHostFound),
        };
        // the url crate drops well known ports for special schemes
        let port = url
            .port_or_known_default()
            .unwrap_or_else(|| default_port(protocol, transport));

        let mut node = ProxyNode::new(format!("{host}:{port}"), protocol, transport);
        if !url.username().is_empty() {
            node.auth = Some(NodeAuth {
                username: decode(url.username())?,
                password: decode(url.password().unwrap_or_default())?,
            });
        }

        // certificate verification is off unless asked for
        node.tls_insecure = true;
        for (k, v) in url.query_pairs() {
            match k.as_ref() {
                "secure" => node.tls_insecure = !parse_bool(&k, &v)?,
                "server_name" | "sni" => node.tls_server_name = Some(v.into_owned()),
                _ => {}
            }
        }

        Ok(node)
    }
}

impl FromStr for ProxyNode {
    type Err = NodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = if s.contains("://") {
            Url::parse(s)?
        } else {
            Url::parse(&format!("http://{s}"))?
        };
        ProxyNode::try_from(&url)
    }
}
