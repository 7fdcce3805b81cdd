/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use bytes::Bytes;
use h2::client::SendRequest;
use http::{HeaderValue, Method, Request, StatusCode, Uri, Version};
use log::{debug, warn};
use rustls::ClientConfig;
use rustls_pki_types::ServerName;
use tokio::sync::Mutex;
use tokio_rustls::TlsConnector;

use crate::chain::ChainDialer;
use crate::hop::{HopStream, tls};
use crate::{ProxyChainError, ProxyNode, TunnelError};

mod stream;
pub use stream::TunnelStream;

pub const PROXY_SWITCH_HEADER: &str = "proxy-switch";
pub const PROXY_SWITCH_TOKEN: &str = "gost";

/// The tunnel-switch request sent to the shortcut node.
///
/// CONNECT requests carry only `:method` and `:authority` on the wire, the
/// tls connection below is what makes the exchange secure.
pub(crate) fn build_switch_request(addr: &str) -> Result<Request<()>, TunnelError> {
    let uri = Uri::builder().authority(addr).build()?;
    let req = Request::builder()
        .method(Method::CONNECT)
        .version(Version::HTTP_2)
        .uri(uri)
        .header(PROXY_SWITCH_HEADER, HeaderValue::from_static(PROXY_SWITCH_TOKEN))
        .body(())?;
    Ok(req)
}

#[derive(Default)]
struct SenderSlot {
    generation: u64,
    sender: Option<SendRequest<Bytes>>,
}

/// Client side of the multiplexed shortcut.
///
/// The underlying connection is reached through the nodes before the
/// shortcut node using plain dials, and is shared by every tunnel request.
pub(crate) struct H2TunnelClient {
    node: Arc<ProxyNode>,
    prefix: Vec<Arc<ProxyNode>>,
    dialer: Arc<ChainDialer>,
    tls_config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
    sender: Mutex<SenderSlot>,
}

impl H2TunnelClient {
    pub(crate) fn new(
        node: Arc<ProxyNode>,
        prefix: Vec<Arc<ProxyNode>>,
        dialer: Arc<ChainDialer>,
    ) -> Result<Self, TunnelError> {
        let tls_config = tls::build_client_config(node.tls_insecure(), &[b"h2".as_slice()])
            .map_err(TunnelError::TlsConfig)?;
        let server_name = tls::server_name(&node).map_err(TunnelError::TlsConfig)?;
        Ok(H2TunnelClient {
            node,
            prefix,
            dialer,
            tls_config,
            server_name,
            sender: Mutex::new(SenderSlot::default()),
        })
    }

    #[inline]
    pub(crate) fn node(&self) -> &Arc<ProxyNode> {
        &self.node
    }

    async fn new_connection(&self) -> Result<SendRequest<Bytes>, TunnelError> {
        let stream = self
            .dialer
            .dial_prefix(self.node.addr(), &self.prefix)
            .await
            .map_err(|e| TunnelError::DialFailed(Box::new(e)))?;

        let tls_stream = TlsConnector::from(self.tls_config.clone())
            .connect(self.server_name.clone(), stream)
            .await
            .map_err(TunnelError::TlsHandshakeFailed)?;

        let mut client_builder = h2::client::Builder::new();
        client_builder.enable_push(false);
        let (h2s, h2s_connection) = client_builder
            .handshake::<_, Bytes>(tls_stream)
            .await
            .map_err(TunnelError::H2HandshakeFailed)?;

        let node_addr = self.node.addr().to_string();
        tokio::spawn(async move {
            if let Err(e) = h2s_connection.await {
                warn!("h2 connection to {node_addr} closed with error: {e}");
            }
        });
        debug!("h2 connection to tunnel node {} established", self.node);
        Ok(h2s)
    }

    async fn fetch_stream(&self) -> Result<SendRequest<Bytes>, TunnelError> {
        let (generation, cached) = {
            let slot = self.sender.lock().await;
            (slot.generation, slot.sender.clone())
        };
        if let Some(h2s) = cached {
            if let Ok(send_req) = h2s.ready().await {
                return Ok(send_req);
            }
        }

        let mut slot = self.sender.lock().await;
        // reconnect only if no other caller has done it meanwhile
        let reconnected = slot.generation != generation;
        let h2s = match slot.sender.clone() {
            Some(h2s) if reconnected => h2s,
            _ => {
                let h2s = self.new_connection().await?;
                slot.generation = slot.generation.wrapping_add(1);
                slot.sender = Some(h2s.clone());
                h2s
            }
        };
        drop(slot);

        h2s.ready().await.map_err(TunnelError::StreamOpenFailed)
    }

    /// Open one tunnel stream ending at the shortcut node.
    pub(crate) async fn open_tunnel_stream(&self) -> Result<TunnelStream, TunnelError> {
        let req = build_switch_request(self.node.addr())?;
        debug!(
            "send tunnel switch request: {} {} {:?} {}: {}",
            req.method(),
            req.uri(),
            req.version(),
            PROXY_SWITCH_HEADER,
            PROXY_SWITCH_TOKEN
        );

        let mut send_req = self.fetch_stream().await?;
        let (rsp_fut, mut send_stream) = send_req
            .send_request(req, false)
            .map_err(TunnelError::SendRequestFailed)?;
        let rsp = rsp_fut.await.map_err(TunnelError::RecvResponseFailed)?;
        let (parts, recv_stream) = rsp.into_parts();

        if parts.status != StatusCode::OK {
            send_stream.send_reset(h2::Reason::CANCEL);
            drop(recv_stream);
            let status = parts.status;
            return Err(TunnelError::UnexpectedStatus(format!(
                "{} {}",
                status.as_str(),
                status.canonical_reason().unwrap_or_default()
            )));
        }
        Ok(TunnelStream::new(recv_stream, send_stream))
    }

    /// Open a tunnel stream and have the shortcut node connect it to `addr`.
    ///
    /// The shortcut node takes one handshake and one connect step on top of
    /// the tunnel, like any other hop.
    pub(crate) async fn open_tunnel_to_target(
        &self,
        addr: &str,
    ) -> Result<HopStream, ProxyChainError> {
        let stream = self.open_tunnel_stream().await?;
        let connector = self.dialer.connector();
        let stream = connector
            .tunnel_handshake(&self.node, Box::new(stream))
            .await
            .map_err(|e| ProxyChainError::HandshakeFailed {
                node: self.node.to_string(),
                source: e,
            })?;
        let mut hop = HopStream::new(stream, self.node.clone());
        hop.connect(connector, addr)
            .await
            .map_err(|e| ProxyChainError::HopConnectFailed {
                node: self.node.to_string(),
                addr: addr.to_string(),
                source: e,
            })?;
        debug!("tunnel node {} connected to {addr}", self.node);
        Ok(hop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_request() {
        let req = build_switch_request("proxy.example.net:443").unwrap();
        assert_eq!(req.method(), Method::CONNECT);
        assert_eq!(req.version(), Version::HTTP_2);
        assert_eq!(req.uri().authority().unwrap().as_str(), "proxy.example.net:443");
        assert!(req.uri().scheme().is_none());
        assert!(req.uri().path().is_empty());
        assert_eq!(
            req.headers().get("Proxy-Switch").unwrap(),
            HeaderValue::from_static("gost")
        );
    }

    #[test]
    fn switch_request_invalid_addr() {
        assert!(matches!(
            build_switch_request("bad addr:443"),
            Err(TunnelError::InvalidRequest(_))
        ));
    }
}
