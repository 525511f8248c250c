use crate::api::{Direction, ScheduleQuery, ScheduleSource};
use crate::config::ScheduleConfig;
use crate::error::{Error, Result};
use crate::hubs::SECONDS_PER_DAY;
use crate::models::Flight;
use crate::singleflight::SingleFlight;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const MAX_TIMESTAMP_SKEW: i64 = 7 * SECONDS_PER_DAY;
const LIVE_CDN_MAX_AGE: u64 = 900;
const ARCHIVE_CDN_MAX_AGE: u64 = 3600;

/// Aggregated board for one hub, direction and day.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubBoard {
    pub flights: Vec<Flight>,
    pub total: usize,
    pub total_fetched: usize,
    pub pages_scanned: u32,
    pub total_pages: u32,
    pub hub: String,
    pub dir: Direction,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardLookup {
    #[serde(flatten)]
    pub board: Arc<HubBoard>,
    pub cached: bool,
    /// Shared-cache lifetime the HTTP layer should advertise.
    #[serde(skip)]
    pub cdn_max_age: u64,
}

struct Entry {
    board: Arc<HubBoard>,
    expires_at: Instant,
}

/// Bounded TTL map; the oldest insertion goes first when full.
struct BoardCache {
    entries: HashMap<ScheduleQuery, Entry>,
    order: VecDeque<ScheduleQuery>,
    capacity: usize,
}

impl BoardCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&mut self, key: &ScheduleQuery) -> Option<Arc<HubBoard>> {
        let expired = Instant::now() >= self.entries.get(key)?.expires_at;
        if expired {
            self.entries.remove(key);
            self.order.retain(|k| k != key);
            return None;
        }
        self.entries.get(key).map(|e| Arc::clone(&e.board))
    }

    fn insert(&mut self, key: ScheduleQuery, board: Arc<HubBoard>, ttl: Duration) {
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        } else if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(
            key,
            Entry {
                board,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Hub board proxy: validates the request, aggregates every page of the
/// board, and caches the result per hub/direction/day.
pub struct ScheduleService {
    source: Arc<dyn ScheduleSource>,
    settings: ScheduleConfig,
    cache: Arc<Mutex<BoardCache>>,
    lookups: SingleFlight<ScheduleQuery, Arc<HubBoard>>,
}

impl ScheduleService {
    pub fn new(source: Arc<dyn ScheduleSource>, settings: ScheduleConfig) -> Self {
        let cache = BoardCache::new(settings.cache_capacity);
        Self {
            source,
            settings,
            cache: Arc::new(Mutex::new(cache)),
            lookups: SingleFlight::new(),
        }
    }

    /// Builds a query from raw request parameters, rejecting anything the
    /// upstream shouldn't see.
    pub fn query(
        &self,
        hub: Option<&str>,
        dir: Option<&str>,
        timestamp: Option<&str>,
    ) -> Result<ScheduleQuery> {
        let (Some(hub), Some(timestamp)) = (hub, timestamp) else {
            return Err(Error::InvalidRequest(
                "Missing required params: hub, timestamp".to_string(),
            ));
        };

        let direction = match dir {
            None => Direction::Departures,
            Some(dir) => Direction::parse(dir).ok_or_else(|| {
                Error::InvalidRequest("dir must be departures or arrivals".to_string())
            })?,
        };

        let valid_hub = (3..=4).contains(&hub.len()) && hub.chars().all(|c| c.is_ascii_alphabetic());
        if !valid_hub {
            return Err(Error::InvalidRequest("Invalid hub code".to_string()));
        }

        let now = Utc::now().timestamp();
        let day_start = timestamp
            .parse::<i64>()
            .ok()
            .filter(|ts| (now - MAX_TIMESTAMP_SKEW..=now + MAX_TIMESTAMP_SKEW).contains(ts))
            .ok_or_else(|| Error::InvalidRequest("Invalid timestamp".to_string()))?;

        Ok(ScheduleQuery {
            hub: hub.to_ascii_uppercase(),
            direction,
            day_start,
            max_pages: self.settings.max_pages,
        })
    }

    pub async fn lookup(&self, query: ScheduleQuery) -> Result<BoardLookup> {
        let archived = Utc::now().timestamp() - query.day_start > SECONDS_PER_DAY;
        let (ttl_secs, cdn_max_age) = if archived {
            (self.settings.archive_ttl_secs, ARCHIVE_CDN_MAX_AGE)
        } else {
            (self.settings.live_ttl_secs, LIVE_CDN_MAX_AGE)
        };

        let hit = self.cache.lock().get(&query);
        if let Some(board) = hit {
            return Ok(BoardLookup {
                board,
                cached: true,
                cdn_max_age,
            });
        }

        let source = Arc::clone(&self.source);
        let cache = Arc::clone(&self.cache);
        let key = query.clone();
        let (flight, started) = self.lookups.join_or_start(query.clone(), move || async move {
            let schedule = source.fetch_hub_schedule(&key).await;
            if let Some(e) = schedule.failure {
                return Err(Error::Upstream(e));
            }

            let board = Arc::new(HubBoard {
                total: schedule.flights.len(),
                flights: schedule.flights,
                total_fetched: schedule.total_fetched,
                pages_scanned: schedule.pages_scanned,
                total_pages: schedule.total_pages,
                hub: key.hub.clone(),
                dir: key.direction,
            });
            debug!("Cached {} {} board ({} flights)", key.hub, key.direction.as_str(), board.total);
            cache
                .lock()
                .insert(key, Arc::clone(&board), Duration::from_secs(ttl_secs));
            Ok(board)
        });

        let board = flight.await?;
        Ok(BoardLookup {
            board,
            cached: !started,
            cdn_max_age,
        })
    }

    pub fn cached_boards(&self) -> usize {
        self.cache.lock().len()
    }
}
