use crate::api::{Direction, ScheduleQuery, ScheduleSource};
use crate::config::IrropsConfig;
use crate::error::{Error, Result};
use crate::hubs::{start_of_day_at, HubDirectory};
use crate::metrics::{compute_metrics, AggregateResult, FlightsByHub};
use crate::models::Flight;
use crate::singleflight::SingleFlight;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct IrropsSettings {
    pub max_pages: u32,
    pub inter_hub_delay: Duration,
    pub result_ttl: Duration,
    pub hub_cache_max_age: Duration,
}

impl From<&IrropsConfig> for IrropsSettings {
    fn from(config: &IrropsConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            inter_hub_delay: Duration::from_millis(config.inter_hub_delay_ms),
            result_ttl: config.result_ttl(),
            hub_cache_max_age: config.hub_cache_max_age(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HubCacheEntry {
    pub flights: Vec<Flight>,
    pub fetched_at: Instant,
}

struct CachedResult {
    value: Arc<AggregateResult>,
    expires_at: Instant,
}

/// What a request gets back: the aggregate plus where it came from.
#[derive(Debug, Clone, Serialize)]
pub struct IrropsSnapshot {
    #[serde(flatten)]
    pub result: Arc<AggregateResult>,
    pub cached: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
}

/// Owns the per-hub fallback cache, the last aggregate and the in-flight pass.
/// Built once at startup.
pub struct IrropsService {
    source: Arc<dyn ScheduleSource>,
    hubs: HubDirectory,
    settings: IrropsSettings,
    hub_cache: Mutex<HashMap<String, HubCacheEntry>>,
    result: Mutex<Option<CachedResult>>,
    passes: SingleFlight<(), Arc<AggregateResult>>,
}

impl IrropsService {
    pub fn new(source: Arc<dyn ScheduleSource>, hubs: HubDirectory, settings: IrropsSettings) -> Self {
        Self {
            source,
            hubs,
            settings,
            hub_cache: Mutex::new(HashMap::new()),
            result: Mutex::new(None),
            passes: SingleFlight::new(),
        }
    }

    /// Returns the current aggregate, running a pass only when the cached one
    /// is missing or expired.
    ///
    /// Callers arriving while a pass is running wait for that pass. If the
    /// pass fails, the previous aggregate is returned marked stale; with no
    /// previous aggregate the error is returned.
    pub async fn snapshot(self: &Arc<Self>) -> Result<IrropsSnapshot> {
        if let Some(result) = self.fresh_result() {
            return Ok(IrropsSnapshot {
                result,
                cached: true,
                stale: false,
            });
        }

        let this = Arc::clone(self);
        let (pass, started) = self
            .passes
            .join_or_start((), move || async move { this.refresh().await });

        match pass.await {
            Ok(result) => Ok(IrropsSnapshot {
                result,
                cached: !started,
                stale: false,
            }),
            Err(e) => {
                error!("IRROPS pass failed: {}", e);
                match self.last_result() {
                    Some(result) => Ok(IrropsSnapshot {
                        result,
                        cached: true,
                        stale: true,
                    }),
                    None => Err(e),
                }
            }
        }
    }

    pub fn is_computing(&self) -> bool {
        self.passes.is_running(&())
    }

    pub fn cached_hub(&self, hub: &str) -> Option<HubCacheEntry> {
        self.hub_cache.lock().get(hub).cloned()
    }

    // A pass that settled between the caller's cache check and this flight
    // starting has already left a fresh result.
    async fn refresh(&self) -> Result<Arc<AggregateResult>> {
        if let Some(result) = self.fresh_result() {
            return Ok(result);
        }
        let result = self.run_pass().await?;
        self.store_result(Arc::clone(&result));
        Ok(result)
    }

    async fn run_pass(&self) -> Result<Arc<AggregateResult>> {
        let hubs = self.hubs.hubs();
        let mut flights_by_hub = FlightsByHub::new();
        let mut failures = 0;

        for (i, hub) in hubs.iter().enumerate() {
            let query = ScheduleQuery {
                hub: hub.code.clone(),
                direction: Direction::Departures,
                day_start: start_of_day_at(Utc::now(), hub.timezone),
                max_pages: self.settings.max_pages,
            };
            let schedule = self.source.fetch_hub_schedule(&query).await;

            let flights = match schedule.failure {
                None if !schedule.flights.is_empty() => {
                    self.remember_hub(&hub.code, &schedule.flights);
                    schedule.flights
                }
                failure => {
                    if let Some(e) = failure {
                        failures += 1;
                        warn!("IRROPS: Error fetching {}: {}", hub.code, e);
                    }
                    // A partial scan beats nothing, but never beats a fresh cached one.
                    self.fallback_flights(&hub.code).unwrap_or(schedule.flights)
                }
            };
            flights_by_hub.insert(hub.code.clone(), flights);

            if i + 1 < hubs.len() {
                sleep(self.settings.inter_hub_delay).await;
            }
        }

        if failures > 0 && flights_by_hub.values().all(Vec::is_empty) {
            return Err(Error::NoHubData);
        }

        let result = compute_metrics(flights_by_hub);
        info!(
            "IRROPS pass complete: {} flights, score {}",
            result.total_flights, result.score
        );
        Ok(Arc::new(result))
    }

    fn remember_hub(&self, hub: &str, flights: &[Flight]) {
        self.hub_cache.lock().insert(
            hub.to_string(),
            HubCacheEntry {
                flights: flights.to_vec(),
                fetched_at: Instant::now(),
            },
        );
    }

    fn fallback_flights(&self, hub: &str) -> Option<Vec<Flight>> {
        let cache = self.hub_cache.lock();
        let entry = cache.get(hub)?;
        let age = entry.fetched_at.elapsed();
        if age >= self.settings.hub_cache_max_age {
            return None;
        }
        info!("IRROPS: Using cached data for {} (age: {}m)", hub, age.as_secs() / 60);
        Some(entry.flights.clone())
    }

    fn fresh_result(&self) -> Option<Arc<AggregateResult>> {
        let cached = self.result.lock();
        let entry = cached.as_ref()?;
        if Instant::now() < entry.expires_at {
            Some(Arc::clone(&entry.value))
        } else {
            None
        }
    }

    fn last_result(&self) -> Option<Arc<AggregateResult>> {
        self.result.lock().as_ref().map(|entry| Arc::clone(&entry.value))
    }

    fn store_result(&self, value: Arc<AggregateResult>) {
        *self.result.lock() = Some(CachedResult {
            value,
            expires_at: Instant::now() + self.settings.result_ttl,
        });
    }
}
