/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use g3_proxy_chain::{
    BoxAsyncStream, HopConnector, HopError, HopProtocol, HopTransport, ProxyChain,
    ProxyChainBuilder, ProxyChainError, ProxyNode,
};

/// Line based hop protocol: `CONNECT <addr>\n`, answered by `OK\n`.
#[derive(Default)]
struct RecordingConnector {
    events: Mutex<Vec<String>>,
    fail_handshake: Option<String>,
}

impl RecordingConnector {
    fn failing_at(addr: &str) -> Self {
        RecordingConnector {
            events: Mutex::new(Vec::new()),
            fail_handshake: Some(addr.to_string()),
        }
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl HopConnector for RecordingConnector {
    async fn handshake(
        &self,
        node: &ProxyNode,
        stream: BoxAsyncStream,
    ) -> Result<BoxAsyncStream, HopError> {
        self.record(format!("handshake {}", node.addr()));
        if self.fail_handshake.as_deref() == Some(node.addr()) {
            return Err(HopError::AuthFailed);
        }
        Ok(stream)
    }

    async fn connect(
        &self,
        node: &ProxyNode,
        stream: &mut BoxAsyncStream,
        addr: &str,
    ) -> Result<(), HopError> {
        self.record(format!("connect {} {addr}", node.addr()));
        stream
            .write_all(format!("CONNECT {addr}\n").as_bytes())
            .await?;

        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            if stream.read(&mut byte).await? == 0 {
                return Err(HopError::RemoteClosed);
            }
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }
        if line != b"OK" {
            return Err(HopError::RequestFailed("refused"));
        }
        Ok(())
    }
}

struct FakeHop {
    addr: String,
    closed: mpsc::UnboundedReceiver<()>,
}

async fn serve_hop(stream: TcpStream) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) | Err(_) => return,
        Ok(_) => {}
    }
    let mut stream = reader.into_inner();
    let Some(target) = line.trim_end().strip_prefix("CONNECT ") else {
        return;
    };
    let Ok(mut upstream) = TcpStream::connect(target).await else {
        let _ = stream.write_all(b"FAIL\n").await;
        return;
    };
    if stream.write_all(b"OK\n").await.is_err() {
        return;
    }
    let _ = tokio::io::copy_bidirectional(&mut stream, &mut upstream).await;
}

async fn spawn_hop() -> FakeHop {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (tx, closed) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                serve_hop(stream).await;
                let _ = tx.send(());
            });
        }
    });
    FakeHop { addr, closed }
}

async fn spawn_echo() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut r, mut w) = stream.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    addr
}

fn tcp_node(addr: &str) -> ProxyNode {
    ProxyNode::new(addr, HopProtocol::Http, HopTransport::Tcp)
}

fn build_chain(connector: &Arc<RecordingConnector>, hops: &[&FakeHop]) -> ProxyChain {
    let mut builder = ProxyChainBuilder::default();
    builder.add_nodes(hops.iter().map(|hop| tcp_node(&hop.addr)));
    builder.set_connector(connector.clone());
    builder.build().unwrap()
}

async fn echo_check(stream: &mut BoxAsyncStream) {
    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn sequential_hops() {
    let a = spawn_hop().await;
    let b = spawn_hop().await;
    let c = spawn_hop().await;
    let target = spawn_echo().await;

    let connector = Arc::new(RecordingConnector::default());
    let chain = build_chain(&connector, &[&a, &b, &c]);
    assert!(!chain.tunnel_enabled());

    let mut stream = chain.dial(&target).await.unwrap();
    echo_check(&mut stream).await;

    assert_eq!(
        connector.events(),
        vec![
            format!("handshake {}", a.addr),
            format!("connect {} {}", a.addr, b.addr),
            format!("handshake {}", b.addr),
            format!("connect {} {}", b.addr, c.addr),
            format!("handshake {}", c.addr),
            format!("connect {} {target}", c.addr),
        ]
    );
}

#[tokio::test]
async fn get_conn_ends_at_last_hop() {
    let a = spawn_hop().await;
    let b = spawn_hop().await;
    let target = spawn_echo().await;

    let connector = Arc::new(RecordingConnector::default());
    let chain = build_chain(&connector, &[&a, &b]);

    let mut stream = chain.get_conn().await.unwrap();
    assert_eq!(
        connector.events(),
        vec![
            format!("handshake {}", a.addr),
            format!("connect {} {}", a.addr, b.addr),
            format!("handshake {}", b.addr),
        ]
    );

    // the stream now talks to b directly
    stream
        .write_all(format!("CONNECT {target}\n").as_bytes())
        .await
        .unwrap();
    let mut ok = [0u8; 3];
    stream.read_exact(&mut ok).await.unwrap();
    assert_eq!(&ok, b"OK\n");
    echo_check(&mut stream).await;
}

#[tokio::test]
async fn handshake_failure_unwinds() {
    let mut a = spawn_hop().await;
    let b = spawn_hop().await;
    let c = spawn_hop().await;
    let target = spawn_echo().await;

    let connector = Arc::new(RecordingConnector::failing_at(&b.addr));
    let chain = build_chain(&connector, &[&a, &b, &c]);

    let e = chain.dial(&target).await.err().unwrap();
    assert!(matches!(
        e,
        ProxyChainError::HandshakeFailed { ref node, source: HopError::AuthFailed }
            if node.ends_with(&b.addr)
    ));

    // the connection to a has been closed
    tokio::time::timeout(Duration::from_secs(5), a.closed.recv())
        .await
        .unwrap()
        .unwrap();

    let events = connector.events();
    assert_eq!(
        events,
        vec![
            format!("handshake {}", a.addr),
            format!("connect {} {}", a.addr, b.addr),
            format!("handshake {}", b.addr),
        ]
    );
    assert!(!events.iter().any(|e| e.contains(&c.addr)));
}

#[tokio::test]
async fn connect_failure_unwinds() {
    let mut a = spawn_hop().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let unused = listener.local_addr().unwrap().to_string();
    drop(listener);

    let connector = Arc::new(RecordingConnector::default());
    let chain = build_chain(&connector, &[&a]);

    let e = chain.dial(&unused).await.err().unwrap();
    assert!(matches!(
        e,
        ProxyChainError::HopConnectFailed { ref addr, .. } if *addr == unused
    ));
    tokio::time::timeout(Duration::from_secs(5), a.closed.recv())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn empty_chain() {
    let target = spawn_echo().await;
    let chain = ProxyChainBuilder::default().build().unwrap();

    let e = chain.get_conn().await.err().unwrap();
    assert!(matches!(e, ProxyChainError::EmptyChain));

    let mut stream = chain.dial(&target).await.unwrap();
    echo_check(&mut stream).await;
}

#[tokio::test]
async fn dial_default_port() {
    let a = spawn_hop().await;

    let connector = Arc::new(RecordingConnector::default());
    let chain = build_chain(&connector, &[&a]);
    let _ = chain.dial("127.0.0.1").await;
    let without_port = connector.events();

    let connector = Arc::new(RecordingConnector::default());
    let chain = build_chain(&connector, &[&a]);
    let _ = chain.dial("127.0.0.1:80").await;
    let with_port = connector.events();

    assert_eq!(without_port, with_port);
    assert_eq!(
        without_port.last().unwrap(),
        &format!("connect {} 127.0.0.1:80", a.addr)
    );
}

#[tokio::test]
async fn activation_keeps_nodes() {
    let mut builder = ProxyChainBuilder::default();
    builder.add_node(tcp_node("10.0.0.1:8080"));
    builder.add_node(ProxyNode::new(
        "10.0.0.2:443",
        HopProtocol::Http,
        HopTransport::Http2,
    ));
    builder.add_node(tcp_node("10.0.0.3:8080"));
    builder.add_node(ProxyNode::new(
        "10.0.0.4:443",
        HopProtocol::Http,
        HopTransport::Http2,
    ));
    builder.set_connector(Arc::new(RecordingConnector::default()));

    let chain = builder.build().unwrap();
    assert_eq!(chain.tunnel_node_index(), Some(1));
    let addrs: Vec<&str> = chain.nodes().iter().map(|n| n.addr()).collect();
    assert_eq!(
        addrs,
        vec!["10.0.0.1:8080", "10.0.0.2:443", "10.0.0.3:8080", "10.0.0.4:443"]
    );
}
