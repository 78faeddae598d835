// Synthetic probers for scheduler and API tests. No network involved.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

use super::{ProbeError, ProbeResult, Prober};

pub fn ok_result(url: &str) -> ProbeResult {
    ProbeResult {
        url: url.to_string(),
        timestamp: 1_700_000_000,
        redirect_chain: Vec::new(),
        error: None,
    }
}

/// Answers every URL after an optional delay. URLs ending in "/404" come
/// back as NotFound. Tracks how many probes overlap.
#[derive(Default)]
pub struct StaticProber {
    pub delay: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

impl StaticProber {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Prober for StaticProber {
    async fn probe(&self, url: &str) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut result = ok_result(url);
        if url.ends_with("/404") {
            result.error = Some(ProbeError::NotFound);
        }
        result
    }
}

/// Holds back the URLs in `held` until release() is called; everything
/// else answers immediately.
pub struct GatedProber {
    held: HashSet<String>,
    gate: Notify,
    open: AtomicBool,
    pub calls: AtomicUsize,
}

impl GatedProber {
    pub fn holding(urls: &[&str]) -> Self {
        Self {
            held: urls.iter().map(|u| u.to_string()).collect(),
            gate: Notify::new(),
            open: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn release(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.gate.notify_waiters();
    }
}

#[async_trait]
impl Prober for GatedProber {
    async fn probe(&self, url: &str) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.held.contains(url) {
            loop {
                let notified = self.gate.notified();
                if self.open.load(Ordering::SeqCst) {
                    break;
                }
                notified.await;
            }
        }

        ok_result(url)
    }
}

/// Panics on the URLs in `bad`, answers the rest.
pub struct PanickingProber {
    pub bad: HashSet<String>,
}

#[async_trait]
impl Prober for PanickingProber {
    async fn probe(&self, url: &str) -> ProbeResult {
        if self.bad.contains(url) {
            panic!("synthetic crash for {}", url);
        }
        ok_result(url)
    }
}
