/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint, value_parser};
use humanize_rs::ParseError;

use g3_proxy_chain::{ProxyChain, ProxyChainBuilder, TcpKeepAliveConfig};

const ARG_FORWARD: &str = "forward";
const ARG_CONFIG: &str = "config";
const ARG_CONNECT_TIMEOUT: &str = "connect-timeout";
const ARG_KEEPALIVE: &str = "keepalive";
const ARG_VERBOSE: &str = "verbose";
const ARG_TARGET: &str = "target";

pub(crate) struct ProcArgs {
    forward_nodes: Vec<String>,
    config_file: Option<PathBuf>,
    connect_timeout: Option<Duration>,
    keepalive: Option<Duration>,
    pub(crate) verbose_level: u8,
    pub(crate) target: Option<String>,
}

impl ProcArgs {
    pub(crate) fn build_chain(&self) -> anyhow::Result<ProxyChain> {
        let mut builder = match &self.config_file {
            Some(path) => g3_proxy_chain::load_yaml_file(path)?,
            None => ProxyChainBuilder::default(),
        };

        let mut config = *builder.config();
        if let Some(timeout) = self.connect_timeout {
            config.set_connect_timeout(timeout);
        }
        if let Some(idle_time) = self.keepalive {
            if idle_time.is_zero() {
                config.set_tcp_keepalive(TcpKeepAliveConfig::disabled());
            } else {
                let mut keepalive = TcpKeepAliveConfig::default();
                keepalive.set_idle_time(idle_time);
                config.set_tcp_keepalive(keepalive);
            }
        }
        builder.set_config(config);

        builder
            .add_node_strs(&self.forward_nodes)
            .context("invalid forward node")?;
        builder.build().context("failed to build proxy chain")
    }
}

fn get_duration(args: &ArgMatches, id: &str) -> anyhow::Result<Option<Duration>> {
    let Some(v) = args.get_one::<String>(id) else {
        return Ok(None);
    };
    match humanize_rs::duration::parse(v) {
        Ok(d) => Ok(Some(d)),
        Err(ParseError::MissingUnit) => {
            let secs = u64::from_str(v).map_err(|_| anyhow!("invalid {id} value {v}"))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(e) => Err(anyhow!("invalid {id} value {v}: {e}")),
    }
}

pub(crate) fn build_cli_args() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new(ARG_FORWARD)
                .help("Proxy node to pass through, in hop order")
                .value_name("NODE")
                .short('F')
                .long(ARG_FORWARD)
                .num_args(1)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new(ARG_CONFIG)
                .help("Chain config file in yaml format")
                .value_name("CONFIG FILE")
                .short('C')
                .long(ARG_CONFIG)
                .num_args(1)
                .value_hint(ValueHint::FilePath)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_CONNECT_TIMEOUT)
                .help("Timeout for each raw tcp connect")
                .value_name("TIMEOUT")
                .long(ARG_CONNECT_TIMEOUT)
                .num_args(1),
        )
        .arg(
            Arg::new(ARG_KEEPALIVE)
                .help("Tcp keepalive idle time, 0 to disable")
                .value_name("IDLE TIME")
                .long(ARG_KEEPALIVE)
                .num_args(1),
        )
        .arg(
            Arg::new(ARG_VERBOSE)
                .help("Show verbose output, repeat for more")
                .short('v')
                .long(ARG_VERBOSE)
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new(ARG_TARGET)
                .help("Target address to relay stdin / stdout to, probe the chain if absent")
                .value_name("HOST:PORT")
                .num_args(1),
        )
}

pub(crate) fn parse_args(args: &ArgMatches) -> anyhow::Result<ProcArgs> {
    let forward_nodes: Vec<String> = args
        .get_many::<String>(ARG_FORWARD)
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let config_file = args.get_one::<PathBuf>(ARG_CONFIG).cloned();
    if config_file.is_none() && forward_nodes.is_empty() && !args.contains_id(ARG_TARGET) {
        return Err(anyhow!("no proxy node or target set"));
    }

    Ok(ProcArgs {
        forward_nodes,
        config_file,
        connect_timeout: get_duration(args, ARG_CONNECT_TIMEOUT)?,
        keepalive: get_duration(args, ARG_KEEPALIVE)?,
        verbose_level: args.get_count(ARG_VERBOSE),
        target: args.get_one::<String>(ARG_TARGET).cloned(),
    })
}
