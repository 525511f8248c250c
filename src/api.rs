use crate::config::UpstreamConfig;
use crate::error::FetchError;
use crate::fetch::ThrottledFetch;
use crate::hubs::SECONDS_PER_DAY;
use crate::models::{AirportScheduleResponse, Flight};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Departures,
    Arrivals,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Departures => "departures",
            Direction::Arrivals => "arrivals",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "departures" => Some(Direction::Departures),
            "arrivals" => Some(Direction::Arrivals),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduleQuery {
    pub hub: String,
    pub direction: Direction,
    pub day_start: i64,
    pub max_pages: u32,
}

/// Everything one paginated scan of a hub board produced.
#[derive(Debug, Clone, Default)]
pub struct HubSchedule {
    pub flights: Vec<Flight>,
    /// Board entries seen across all scanned pages, before operator filtering.
    pub total_fetched: usize,
    pub pages_scanned: u32,
    pub total_pages: u32,
    /// Set when a page fetch or decode failed and stopped the scan early.
    pub failure: Option<FetchError>,
}

/// Where hub schedules come from. The orchestrator only sees this trait.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn fetch_hub_schedule(&self, query: &ScheduleQuery) -> HubSchedule;
}

pub struct ScheduleProvider {
    fetch: ThrottledFetch,
    base_url: String,
    operator: String,
    page_size: u32,
    page_delay: Duration,
}

impl ScheduleProvider {
    pub fn new(config: &UpstreamConfig) -> Result<Self, FetchError> {
        Ok(Self {
            fetch: ThrottledFetch::new(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            operator: config.operator_iata.clone(),
            page_size: config.page_size,
            page_delay: Duration::from_millis(config.inter_page_delay_ms),
        })
    }

    fn page_url(&self, query: &ScheduleQuery, page: u32) -> Result<Url, FetchError> {
        let base = format!("{}/common/v1/airport.json", self.base_url);
        Url::parse_with_params(
            &base,
            &[
                ("code", query.hub.clone()),
                ("plugin[]", "schedule".to_string()),
                ("plugin-setting[schedule][mode]", query.direction.as_str().to_string()),
                ("plugin-setting[schedule][timestamp]", query.day_start.to_string()),
                ("page", page.to_string()),
                ("limit", self.page_size.to_string()),
            ],
        )
        .map_err(|e| FetchError::Transport(e.to_string()))
    }

    async fn fetch_page(
        &self,
        query: &ScheduleQuery,
        page: u32,
    ) -> Result<AirportScheduleResponse, FetchError> {
        let url = self.page_url(query, page)?;
        let resp = self.fetch.get(url.as_str()).await?;
        // Body reads share the request deadline, so this can still time out.
        resp.json::<AirportScheduleResponse>()
            .await
            .map_err(FetchError::from_reqwest)
    }

    fn scheduled_time(&self, flight: &Flight, direction: Direction) -> Option<i64> {
        match direction {
            Direction::Departures => flight.scheduled_departure(),
            Direction::Arrivals => flight.scheduled_arrival(),
        }
    }
}

#[async_trait]
impl ScheduleSource for ScheduleProvider {
    async fn fetch_hub_schedule(&self, query: &ScheduleQuery) -> HubSchedule {
        let day_end = query.day_start + SECONDS_PER_DAY;
        let mut out = HubSchedule {
            total_pages: 1,
            ..HubSchedule::default()
        };
        let mut page = 1;

        while page <= out.total_pages && page <= query.max_pages {
            let body = match self.fetch_page(query, page).await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Failed to fetch {} page {}: {}", query.hub, page, e);
                    out.failure = Some(e);
                    break;
                }
            };

            let departures = query.direction == Direction::Departures;
            let Some(board) = body.into_board(departures) else {
                debug!("No {} board for {} page {}", query.direction.as_str(), query.hub, page);
                break;
            };
            let entries = board.data.unwrap_or_default();
            if entries.is_empty() {
                break;
            }

            out.total_pages = board
                .page
                .and_then(|p| p.total)
                .filter(|total| *total > 0)
                .unwrap_or(1);
            out.total_fetched += entries.len();
            out.pages_scanned += 1;

            let mut past_day = false;
            for flight in entries.into_iter().filter_map(|entry| entry.flight) {
                if flight.operator_iata() != Some(self.operator.as_str()) {
                    continue;
                }
                if let Some(scheduled) = self.scheduled_time(&flight, query.direction) {
                    if scheduled >= day_end {
                        past_day = true;
                        break;
                    }
                }
                out.flights.push(flight);
            }
            if past_day {
                debug!("{} page {} crossed into the next day", query.hub, page);
                break;
            }

            page += 1;
            if page <= out.total_pages && page <= query.max_pages {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        out
    }
}
