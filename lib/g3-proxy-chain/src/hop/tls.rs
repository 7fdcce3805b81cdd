/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use super::{BoxAsyncStream, HopError};
use crate::ProxyNode;

/// Accepts any server certificate, but still checks handshake signatures.
#[derive(Debug)]
struct NoVerify {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for NoVerify {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

pub(crate) fn build_client_config(
    insecure: bool,
    alpn_protocols: &[&[u8]],
) -> Result<Arc<ClientConfig>, HopError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let algorithms = provider.signature_verification_algorithms;
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(HopError::TlsConfig)?;

    let mut config = if insecure {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerify { algorithms }))
            .with_no_client_auth()
    } else {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    config.alpn_protocols = alpn_protocols.iter().map(|p| p.to_vec()).collect();
    Ok(Arc::new(config))
}

pub(crate) fn server_name(node: &ProxyNode) -> Result<ServerName<'static>, HopError> {
    let name = node.tls_server_name();
    ServerName::try_from(name.to_string()).map_err(|_| HopError::InvalidServerName(name.to_string()))
}

pub(crate) struct TlsClientConfigs {
    verified: Arc<ClientConfig>,
    insecure: Arc<ClientConfig>,
}

impl TlsClientConfigs {
    pub(crate) fn new() -> Result<Self, HopError> {
        Ok(TlsClientConfigs {
            verified: build_client_config(false, &[])?,
            insecure: build_client_config(true, &[])?,
        })
    }

    fn select(&self, node: &ProxyNode) -> Arc<ClientConfig> {
        if node.tls_insecure() {
            self.insecure.clone()
        } else {
            self.verified.clone()
        }
    }

    pub(crate) async fn connect(
        &self,
        node: &ProxyNode,
        stream: BoxAsyncStream,
    ) -> Result<TlsStream<BoxAsyncStream>, HopError> {
        let server_name = server_name(node)?;
        TlsConnector::from(self.select(node))
            .connect(server_name, stream)
            .await
            .map_err(HopError::TlsHandshakeFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HopProtocol, HopTransport};

    #[test]
    fn alpn() {
        let config = build_client_config(true, &[b"h2".as_slice()]).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec()]);

        let config = build_client_config(false, &[]).unwrap();
        assert!(config.alpn_protocols.is_empty());
    }

    #[test]
    fn server_name_from_node() {
        let node = ProxyNode::new("127.0.0.1:443", HopProtocol::Http, HopTransport::Tls);
        assert!(matches!(server_name(&node), Ok(ServerName::IpAddress(_))));

        let node = ProxyNode::new("proxy.example.net:443", HopProtocol::Http, HopTransport::Tls);
        assert!(matches!(server_name(&node), Ok(ServerName::DnsName(_))));

        let node = ProxyNode::new("127.0.0.1:443", HopProtocol::Http, HopTransport::Tls)
            .with_tls_server_name("bad name");
        assert!(matches!(
            server_name(&node),
            Err(HopError::InvalidServerName(_))
        ));
    }
}
