use crate::config::IrropsConfig;
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

pub const SECONDS_PER_DAY: i64 = 86_400;
// Before 06:00 local the previous operational day is still running.
const DAY_ROLLOVER_HOUR: u32 = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct Hub {
    pub code: String,
    pub timezone: Tz,
}

/// Ordered hub list plus the zone used for codes it doesn't know.
#[derive(Debug, Clone)]
pub struct HubDirectory {
    hubs: Vec<Hub>,
    default_tz: Tz,
}

impl HubDirectory {
    pub fn from_config(config: &IrropsConfig) -> Self {
        let default_tz = config.default_timezone.parse::<Tz>().unwrap_or_else(|e| {
            warn!(
                "Invalid default timezone '{}': {}. Using America/New_York.",
                config.default_timezone, e
            );
            chrono_tz::America::New_York
        });

        let hubs = config
            .hubs
            .iter()
            .map(|hub| {
                let timezone = hub.timezone.parse::<Tz>().unwrap_or_else(|e| {
                    warn!("Invalid timezone for hub {}: {}. Using {}.", hub.code, e, default_tz);
                    default_tz
                });
                Hub {
                    code: hub.code.to_uppercase(),
                    timezone,
                }
            })
            .collect();

        Self { hubs, default_tz }
    }

    pub fn hubs(&self) -> &[Hub] {
        &self.hubs
    }

    pub fn timezone(&self, code: &str) -> Tz {
        self.hubs
            .iter()
            .find(|hub| hub.code.eq_ignore_ascii_case(code))
            .map(|hub| hub.timezone)
            .unwrap_or(self.default_tz)
    }

    /// Operational-day start for `code`, in Unix seconds, as of now.
    pub fn start_of_day(&self, code: &str) -> i64 {
        start_of_day_at(Utc::now(), self.timezone(code))
    }
}

/// Local midnight in `tz` as Unix seconds, moved back a day before 06:00 local.
pub fn start_of_day_at(now: DateTime<Utc>, tz: Tz) -> i64 {
    let local = now.with_timezone(&tz);
    let since_midnight = i64::from(local.num_seconds_from_midnight());
    let start_of_today = now.timestamp() - since_midnight;

    if local.hour() < DAY_ROLLOVER_HOUR {
        start_of_today - SECONDS_PER_DAY
    } else {
        start_of_today
    }
}
