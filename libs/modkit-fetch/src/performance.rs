//! Timing of a single round trip.
//!
//! hyper does not expose DNS, connect, or TLS hooks through the pooled
//! client, so only what is observable from the outside is recorded: time to
//! response head, body read time, and the socket addresses the connector
//! attaches to the response.

use hyper_util::client::legacy::connect::HttpInfo;
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime};

/// Metrics of the round trip that produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Performance {
    started_at: SystemTime,
    response_time: Duration,
    body_time: Duration,
    remote_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
}

impl Performance {
    /// Wall-clock time the request was handed to the transport.
    #[must_use]
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Time until the response head arrived.
    #[must_use]
    pub fn response_time(&self) -> Duration {
        self.response_time
    }

    /// Time spent reading and decoding the body.
    #[must_use]
    pub fn body_time(&self) -> Duration {
        self.body_time
    }

    #[must_use]
    pub fn total(&self) -> Duration {
        self.response_time + self.body_time
    }

    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

/// Write-once recorder, created fresh for every transport attempt.
#[derive(Debug)]
pub struct PerformanceRecorder {
    started_at: SystemTime,
    start: Instant,
    head: Option<Instant>,
    remote_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
}

impl PerformanceRecorder {
    #[must_use]
    pub fn start() -> Self {
        Self {
            started_at: SystemTime::now(),
            start: Instant::now(),
            head: None,
            remote_addr: None,
            local_addr: None,
        }
    }

    /// Mark the response head; later calls are ignored.
    pub fn record_head<B>(&mut self, response: &http::Response<B>) {
        if self.head.is_some() {
            return;
        }
        self.head = Some(Instant::now());
        if let Some(info) = response.extensions().get::<HttpInfo>() {
            self.remote_addr = Some(info.remote_addr());
            self.local_addr = Some(info.local_addr());
        }
    }

    /// Time since the attempt started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Close the attempt once the body has been read.
    #[must_use]
    pub fn finish(self) -> Performance {
        let now = Instant::now();
        let head = self.head.unwrap_or(now);
        Performance {
            started_at: self.started_at,
            response_time: head.saturating_duration_since(self.start),
            body_time: now.saturating_duration_since(head),
            remote_addr: self.remote_addr,
            local_addr: self.local_addr,
        }
    }
}
