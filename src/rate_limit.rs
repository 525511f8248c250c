use axum::http::HeaderMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

const WINDOW: Duration = Duration::from_secs(60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

struct Store {
    hits: HashMap<String, VecDeque<Instant>>,
    last_sweep: Instant,
}

pub struct SlidingWindowLimiter {
    name: String,
    max_per_window: usize,
    store: Mutex<Store>,
}

impl SlidingWindowLimiter {
    pub fn new(name: &str, max_per_minute: u32) -> Self {
        Self {
            name: name.to_string(),
            max_per_window: max_per_minute as usize,
            store: Mutex::new(Store {
                hits: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true when `ip` is over its budget. Allowed requests are recorded.
    pub fn is_limited(&self, ip: &str) -> bool {
        self.is_limited_at(ip, Instant::now())
    }

    pub fn is_limited_at(&self, ip: &str, now: Instant) -> bool {
        let mut store = self.store.lock();

        let log = store.hits.entry(ip.to_string()).or_default();
        evict_expired(log, now);
        let limited = log.len() >= self.max_per_window;
        if !limited {
            log.push_back(now);
        }

        if now.saturating_duration_since(store.last_sweep) > SWEEP_INTERVAL {
            store.last_sweep = now;
            sweep(&mut store.hits, now);
            debug!("Rate limiter '{}' swept, {} IPs tracked", self.name, store.hits.len());
        }

        limited
    }

    /// Number of IPs currently tracked.
    pub fn tracked(&self) -> usize {
        self.store.lock().hits.len()
    }
}

fn evict_expired(log: &mut VecDeque<Instant>, now: Instant) {
    while let Some(front) = log.front() {
        if now.saturating_duration_since(*front) > WINDOW {
            log.pop_front();
        } else {
            break;
        }
    }
}

fn sweep(hits: &mut HashMap<String, VecDeque<Instant>>, now: Instant) {
    hits.retain(|_, log| {
        evict_expired(log, now);
        !log.is_empty()
    });
}

/// Client address as reported by the edge proxy: `x-real-ip`, then the first
/// `x-forwarded-for` hop, then `"unknown"`.
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(real) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real = real.trim();
        if !real.is_empty() {
            return real.to_string();
        }
    }

    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or("unknown")
        .to_string()
}
