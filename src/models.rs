use serde::{Deserialize, Serialize};

// Upstream flight entries are sparse: any nested object may be missing or
// null, so every level defaults instead of failing the whole page.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Flight {
    pub identification: Option<Identification>,
    pub airline: Option<Airline>,
    pub airport: Option<RouteAirports>,
    pub status: Option<FlightStatus>,
    pub time: Option<FlightTimes>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Identification {
    pub number: Option<FlightNumber>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightNumber {
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Airline {
    pub name: Option<String>,
    pub code: Option<Codes>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Codes {
    pub iata: Option<String>,
    pub icao: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteAirports {
    pub origin: Option<AirportRef>,
    pub destination: Option<AirportRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirportRef {
    pub code: Option<Codes>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightStatus {
    pub generic: Option<GenericStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenericStatus {
    pub status: Option<StatusText>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusText {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightTimes {
    pub scheduled: Option<TimePair>,
    pub real: Option<TimePair>,
    pub estimated: Option<TimePair>,
}

/// Departure/arrival epoch seconds. Zero is treated the same as absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimePair {
    pub departure: Option<i64>,
    pub arrival: Option<i64>,
}

impl Flight {
    pub fn operator_iata(&self) -> Option<&str> {
        self.airline.as_ref()?.code.as_ref()?.iata.as_deref()
    }

    pub fn ident(&self) -> Option<&str> {
        self.identification.as_ref()?.number.as_ref()?.default.as_deref()
    }

    pub fn origin_iata(&self) -> Option<&str> {
        self.airport.as_ref()?.origin.as_ref()?.code.as_ref()?.iata.as_deref()
    }

    pub fn destination_iata(&self) -> Option<&str> {
        self.airport.as_ref()?.destination.as_ref()?.code.as_ref()?.iata.as_deref()
    }

    /// Lower-cased generic status text, empty when the upstream omitted it.
    pub fn status_text(&self) -> String {
        self.status
            .as_ref()
            .and_then(|s| s.generic.as_ref())
            .and_then(|g| g.status.as_ref())
            .and_then(|s| s.text.as_deref())
            .unwrap_or("")
            .to_lowercase()
    }

    pub fn scheduled_departure(&self) -> Option<i64> {
        self.times(|t| t.scheduled, |p| p.departure)
    }

    pub fn scheduled_arrival(&self) -> Option<i64> {
        self.times(|t| t.scheduled, |p| p.arrival)
    }

    pub fn real_departure(&self) -> Option<i64> {
        self.times(|t| t.real, |p| p.departure)
    }

    pub fn estimated_departure(&self) -> Option<i64> {
        self.times(|t| t.estimated, |p| p.departure)
    }

    fn times(
        &self,
        kind: impl Fn(&FlightTimes) -> Option<TimePair>,
        leg: impl Fn(&TimePair) -> Option<i64>,
    ) -> Option<i64> {
        self.time
            .as_ref()
            .and_then(kind)
            .and_then(|pair| leg(&pair))
            .filter(|t| *t != 0)
    }
}

/// Top-level body of the upstream airport schedule endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AirportScheduleResponse {
    pub result: Option<ResultEnvelope>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResultEnvelope {
    pub response: Option<ResponseEnvelope>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResponseEnvelope {
    pub airport: Option<AirportEnvelope>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AirportEnvelope {
    #[serde(rename = "pluginData")]
    pub plugin_data: Option<PluginData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PluginData {
    pub schedule: Option<Schedule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Schedule {
    pub departures: Option<ScheduleBoard>,
    pub arrivals: Option<ScheduleBoard>,
}

/// One page of a departures or arrivals board.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ScheduleBoard {
    pub page: Option<PageInfo>,
    pub data: Option<Vec<BoardEntry>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PageInfo {
    pub current: Option<u32>,
    pub total: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BoardEntry {
    pub flight: Option<Flight>,
}

impl AirportScheduleResponse {
    /// Consumes the envelope and returns the board for one direction, if any.
    pub fn into_board(self, departures: bool) -> Option<ScheduleBoard> {
        let schedule = self.result?.response?.airport?.plugin_data?.schedule?;
        if departures {
            schedule.departures
        } else {
            schedule.arrivals
        }
    }
}
