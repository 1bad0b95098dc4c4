// File: config.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use std::time::Duration;

use crate::request::DEFAULT_USER_AGENT;

/// Knobs for one synchronized run.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    tail_bytes: usize,
    sync_delay: Duration,
    read_timeout: Option<Duration>,
    connect_timeout: Duration,
    request_gzip: bool,
    concurrent_tails: bool,
    insecure: bool,
    user_agent: String,
}

impl AttackConfig {
    pub fn new() -> Self {
        Self {
            tail_bytes: 1,
            sync_delay: Duration::from_millis(100),
            read_timeout: Some(Duration::from_secs(10)),
            connect_timeout: Duration::from_millis(5000),
            request_gzip: true,
            concurrent_tails: false,
            insecure: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn set_tail_bytes(&mut self, tail_bytes: usize) {
        self.tail_bytes = tail_bytes;
    }

    /// Body bytes withheld from every request until the release.
    pub fn tail_bytes(&self) -> usize {
        self.tail_bytes
    }

    pub fn set_sync_delay(&mut self, sync_delay: Duration) {
        self.sync_delay = sync_delay;
    }

    pub fn sync_delay(&self) -> Duration {
        self.sync_delay
    }

    /// `None` waits for responses without a deadline.
    pub fn set_read_timeout(&mut self, read_timeout: Option<Duration>) {
        self.read_timeout = read_timeout;
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn set_connect_timeout(&mut self, connect_timeout: Duration) {
        self.connect_timeout = connect_timeout;
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn set_request_gzip(&mut self, request_gzip: bool) {
        self.request_gzip = request_gzip;
    }

    pub fn request_gzip(&self) -> bool {
        self.request_gzip
    }

    pub fn set_concurrent_tails(&mut self, concurrent_tails: bool) {
        self.concurrent_tails = concurrent_tails;
    }

    pub fn concurrent_tails(&self) -> bool {
        self.concurrent_tails
    }

    pub fn set_insecure(&mut self, insecure: bool) {
        self.insecure = insecure;
    }

    pub fn insecure(&self) -> bool {
        self.insecure
    }

    pub fn set_user_agent(&mut self, user_agent: String) {
        self.user_agent = user_agent;
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
