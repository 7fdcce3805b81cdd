/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use anyhow::Context;
use log::{debug, info};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};

use g3_proxy_chain::{BoxAsyncStream, ProxyChain};

mod logger;
mod opts;

fn main() -> anyhow::Result<()> {
    let args = opts::build_cli_args().get_matches();
    let proc_args = opts::parse_args(&args)?;
    let _log_guard = logger::setup(proc_args.verbose_level).context("failed to setup logger")?;

    let chain = proc_args.build_chain()?;
    debug!(
        "proxy chain of {} nodes, tunnel node index {:?}",
        chain.nodes().len(),
        chain.tunnel_node_index()
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    let r = rt.block_on(run(chain, proc_args.target));
    // a pending stdin read would block the runtime drop
    rt.shutdown_background();
    r
}

async fn run(chain: ProxyChain, target: Option<String>) -> anyhow::Result<()> {
    match target {
        Some(target) => {
            let stream = chain
                .dial(&target)
                .await
                .context(format!("failed to connect to {target}"))?;
            info!("connected to {target}");
            relay(stream).await
        }
        None => {
            let _stream = chain
                .get_conn()
                .await
                .context("failed to connect to the last node")?;
            if let Some(node) = chain.last_node() {
                println!("connected to {node}");
            }
            Ok(())
        }
    }
}

async fn send_stdin(mut w: WriteHalf<BoxAsyncStream>) -> anyhow::Result<()> {
    let mut stdin = tokio::io::stdin();
    tokio::io::copy(&mut stdin, &mut w)
        .await
        .context("failed to send to remote")?;
    w.shutdown().await.context("failed to shutdown remote")?;
    Ok(())
}

async fn recv_stdout(mut r: ReadHalf<BoxAsyncStream>) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    tokio::io::copy(&mut r, &mut stdout)
        .await
        .context("failed to recv from remote")?;
    stdout.flush().await?;
    Ok(())
}

async fn relay(stream: BoxAsyncStream) -> anyhow::Result<()> {
    let (r, w) = tokio::io::split(stream);
    let send = send_stdin(w);
    let recv = recv_stdout(r);
    tokio::pin!(send);
    tokio::pin!(recv);

    let mut send_done = false;
    loop {
        tokio::select! {
            s = &mut send, if !send_done => {
                s?;
                send_done = true;
            }
            r = &mut recv => return r,
        }
    }
}
