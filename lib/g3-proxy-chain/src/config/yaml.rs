/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use humanize_rs::ParseError;
use yaml_rust::{Yaml, YamlLoader};

use super::{ChainConfig, TcpKeepAliveConfig};
use crate::{ProxyChainBuilder, ProxyNode};

fn normalize_key(k: &Yaml) -> anyhow::Result<String> {
    match k {
        Yaml::String(s) => Ok(s.to_lowercase().replace('-', "_")),
        _ => Err(anyhow!("yaml key should be 'string'")),
    }
}

fn foreach_kv<F>(value: &Yaml, mut f: F) -> anyhow::Result<()>
where
    F: FnMut(&str, &Yaml) -> anyhow::Result<()>,
{
    let Yaml::Hash(map) = value else {
        return Err(anyhow!("yaml value type should be 'map'"));
    };
    for (k, v) in map.iter() {
        let key = normalize_key(k)?;
        f(&key, v).context(format!("failed to parse value of key {key}"))?;
    }
    Ok(())
}

fn as_bool(v: &Yaml) -> anyhow::Result<bool> {
    match v {
        Yaml::Boolean(b) => Ok(*b),
        Yaml::String(s) => match s.to_lowercase().as_str() {
            "on" | "true" | "yes" | "1" => Ok(true),
            "off" | "false" | "no" | "0" => Ok(false),
            _ => Err(anyhow!("invalid yaml string value for 'bool': {s}")),
        },
        Yaml::Integer(i) => Ok(*i != 0),
        _ => Err(anyhow!(
            "yaml value type for 'bool' should be 'boolean' / 'string' / 'integer'"
        )),
    }
}

fn as_duration(v: &Yaml) -> anyhow::Result<Duration> {
    match v {
        Yaml::String(value) => match humanize_rs::duration::parse(value) {
            Ok(v) => Ok(v),
            Err(ParseError::MissingUnit) => {
                let u = u64::from_str(value).map_err(|_| anyhow!("invalid duration string"))?;
                Ok(Duration::from_secs(u))
            }
            Err(e) => Err(anyhow!("invalid humanize duration string: {e}")),
        },
        Yaml::Integer(value) => u64::try_from(*value)
            .map(Duration::from_secs)
            .map_err(|_| anyhow!("negative duration value")),
        _ => Err(anyhow!(
            "yaml value type for humanize duration should be 'string' or 'integer'"
        )),
    }
}

impl TcpKeepAliveConfig {
    /// Accepts a bool, an idle time, or a map with `enable` and `idle_time`.
    pub fn parse_yaml(value: &Yaml) -> anyhow::Result<Self> {
        match value {
            Yaml::Boolean(enable) => {
                let mut config = TcpKeepAliveConfig::default();
                config.set_enable(*enable);
                Ok(config)
            }
            Yaml::Hash(_) => {
                let mut config = TcpKeepAliveConfig::default();
                foreach_kv(value, |k, v| match k {
                    "enable" | "enabled" => {
                        config.set_enable(as_bool(v)?);
                        Ok(())
                    }
                    "idle_time" | "interval" => {
                        config.set_idle_time(as_duration(v)?);
                        Ok(())
                    }
                    _ => Err(anyhow!("invalid key {k}")),
                })?;
                Ok(config)
            }
            _ => {
                let mut config = TcpKeepAliveConfig::default();
                config.set_idle_time(as_duration(value)?);
                Ok(config)
            }
        }
    }
}

impl ChainConfig {
    fn set_yaml_kv(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match k {
            "connect_timeout" | "dial_timeout" => {
                self.connect_timeout = as_duration(v)?;
                Ok(())
            }
            "tcp_keepalive" | "keepalive" => {
                self.tcp_keepalive = TcpKeepAliveConfig::parse_yaml(v)?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    pub fn parse_yaml(value: &Yaml) -> anyhow::Result<Self> {
        let mut config = ChainConfig::default();
        foreach_kv(value, |k, v| config.set_yaml_kv(k, v))?;
        Ok(config)
    }
}

impl ProxyChainBuilder {
    /// Parse a chain definition: the [`ChainConfig`] keys plus a `nodes` list.
    pub fn parse_yaml(value: &Yaml) -> anyhow::Result<Self> {
        let mut config = ChainConfig::default();
        let mut nodes = Vec::new();
        foreach_kv(value, |k, v| match k {
            "nodes" | "proxy_nodes" => {
                let Yaml::Array(seq) = v else {
                    return Err(anyhow!("yaml value type should be 'array'"));
                };
                for (i, node) in seq.iter().enumerate() {
                    let Yaml::String(s) = node else {
                        return Err(anyhow!("node #{i} should be a 'string'"));
                    };
                    let node = ProxyNode::from_str(s).context(format!("invalid node #{i}"))?;
                    nodes.push(node);
                }
                Ok(())
            }
            _ => config.set_yaml_kv(k, v),
        })?;

        let mut builder = ProxyChainBuilder::new(config);
        builder.add_nodes(nodes);
        Ok(builder)
    }
}

pub fn load_yaml_file(path: &Path) -> anyhow::Result<ProxyChainBuilder> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read file {}: {e}", path.display()))?;
    let docs = YamlLoader::load_from_str(&content)
        .map_err(|e| anyhow!("invalid yaml file {}: {e}", path.display()))?;
    let doc = docs
        .first()
        .ok_or_else(|| anyhow!("no yaml document found in {}", path.display()))?;
    ProxyChainBuilder::parse_yaml(doc).context(format!("invalid chain config {}", path.display()))
}
