/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

#[cfg(feature = "yaml")]
mod yaml;
#[cfg(feature = "yaml")]
pub use yaml::load_yaml_file;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_TCP_KEEPALIVE_IDLE: Duration = Duration::from_secs(180);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TcpKeepAliveConfig {
    enabled: bool,
    idle_time: Duration,
}

impl Default for TcpKeepAliveConfig {
    fn default() -> Self {
        TcpKeepAliveConfig {
            enabled: true,
            idle_time: DEFAULT_TCP_KEEPALIVE_IDLE,
        }
    }
}

impl TcpKeepAliveConfig {
    pub fn disabled() -> Self {
        TcpKeepAliveConfig {
            enabled: false,
            idle_time: DEFAULT_TCP_KEEPALIVE_IDLE,
        }
    }

    pub fn set_enable(&mut self, enable: bool) {
        self.enabled = enable;
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_idle_time(&mut self, idle_time: Duration) {
        self.idle_time = idle_time;
    }

    #[inline]
    pub fn idle_time(&self) -> Duration {
        self.idle_time
    }
}

/// Values applied to every raw tcp connection made by a chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChainConfig {
    connect_timeout: Duration,
    tcp_keepalive: TcpKeepAliveConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tcp_keepalive: TcpKeepAliveConfig::default(),
        }
    }
}

impl ChainConfig {
    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.connect_timeout = timeout;
    }

    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn set_tcp_keepalive(&mut self, keepalive: TcpKeepAliveConfig) {
        self.tcp_keepalive = keepalive;
    }

    #[inline]
    pub fn tcp_keepalive(&self) -> &TcpKeepAliveConfig {
        &self.tcp_keepalive
    }
}
