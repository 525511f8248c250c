use crate::models::Flight;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

pub type FlightsByHub = BTreeMap<String, Vec<Flight>>;

const WORST_DELAYS_LIMIT: usize = 8;
const WORST_DELAY_MIN: i64 = 15;
const DELAYED_30: i64 = 30;
const DELAYED_60: i64 = 60;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubMetrics {
    pub total: usize,
    pub cancellations: usize,
    pub delayed30: usize,
    pub delayed60: usize,
    pub diversions: usize,
    pub operated: usize,
    pub on_time: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayedFlight {
    pub ident: String,
    pub route: String,
    pub delay: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub score: f64,
    pub total_flights: usize,
    pub cancellations: usize,
    pub delayed30: usize,
    pub delayed60: usize,
    pub diversions: usize,
    pub worst_delays: Vec<DelayedFlight>,
    pub hub_metrics: BTreeMap<String, HubMetrics>,
    pub hub_flights: FlightsByHub,
    pub generated_at: DateTime<Utc>,
}

enum Outcome {
    Cancelled,
    /// Never moved and no real departure: still scheduled, not counted either way.
    Pending { diverted: bool },
    Operated { diverted: bool, delay: Option<i64> },
}

fn classify(flight: &Flight) -> Outcome {
    let status = flight.status_text();
    if status == "canceled" || status == "cancelled" {
        return Outcome::Cancelled;
    }

    let diverted = status == "diverted";
    let moved = matches!(status.as_str(), "departed" | "en-route" | "landed" | "diverted");
    let real = flight.real_departure();
    if !moved && real.is_none() {
        return Outcome::Pending { diverted };
    }

    // Estimated time only stands in for flights known to have moved.
    let actual = real.or_else(|| if moved { flight.estimated_departure() } else { None });
    let Some(actual) = actual else {
        return Outcome::Pending { diverted };
    };

    let delay = flight
        .scheduled_departure()
        .filter(|scheduled| actual > *scheduled)
        .map(|scheduled| ((actual - scheduled) as f64 / 60.0).round() as i64);

    Outcome::Operated { diverted, delay }
}

fn route(flight: &Flight) -> String {
    format!(
        "{}→{}",
        flight.origin_iata().unwrap_or("?"),
        flight.destination_iata().unwrap_or("?")
    )
}

fn hub_metrics(flights: &[Flight], worst: &mut Vec<DelayedFlight>) -> HubMetrics {
    let mut m = HubMetrics {
        total: flights.len(),
        ..HubMetrics::default()
    };

    for flight in flights {
        match classify(flight) {
            Outcome::Cancelled => m.cancellations += 1,
            Outcome::Pending { diverted } => {
                if diverted {
                    m.diversions += 1;
                }
            }
            Outcome::Operated { diverted, delay } => {
                if diverted {
                    m.diversions += 1;
                }
                m.operated += 1;

                let delay = delay.unwrap_or(0);
                if delay > DELAYED_30 {
                    m.delayed30 += 1;
                } else {
                    m.on_time += 1;
                }
                if delay > DELAYED_60 {
                    m.delayed60 += 1;
                }
                if delay > WORST_DELAY_MIN {
                    worst.push(DelayedFlight {
                        ident: flight.ident().unwrap_or("?").to_string(),
                        route: route(flight),
                        delay,
                    });
                }
            }
        }
    }
    m
}

/// Weighted disruption score: higher is worse. A flight over 60 minutes late
/// counts in both delay buckets.
pub fn disruption_score(
    total: usize,
    cancellations: usize,
    delayed30: usize,
    delayed60: usize,
    diversions: usize,
) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let weighted = cancellations * 3 + delayed60 * 2 + delayed30 + diversions * 2;
    let score = weighted as f64 / total as f64 * 100.0;
    (score * 10.0).round() / 10.0
}

pub fn compute_metrics(flights_by_hub: FlightsByHub) -> AggregateResult {
    let mut worst_delays = Vec::new();
    let hub_metrics: BTreeMap<String, HubMetrics> = flights_by_hub
        .iter()
        .map(|(hub, flights)| (hub.clone(), hub_metrics(flights, &mut worst_delays)))
        .collect();

    let sum = |f: fn(&HubMetrics) -> usize| hub_metrics.values().map(f).sum::<usize>();
    let total_flights = sum(|m| m.total);
    let cancellations = sum(|m| m.cancellations);
    let delayed30 = sum(|m| m.delayed30);
    let delayed60 = sum(|m| m.delayed60);
    let diversions = sum(|m| m.diversions);

    // Stable sort keeps hub order among equal delays.
    worst_delays.sort_by(|a, b| b.delay.cmp(&a.delay));
    worst_delays.truncate(WORST_DELAYS_LIMIT);

    AggregateResult {
        score: disruption_score(total_flights, cancellations, delayed30, delayed60, diversions),
        total_flights,
        cancellations,
        delayed30,
        delayed60,
        diversions,
        worst_delays,
        hub_metrics,
        hub_flights: flights_by_hub,
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AirportRef, Codes, FlightNumber, FlightStatus, FlightTimes, GenericStatus, Identification,
        RouteAirports, StatusText, TimePair,
    };

    const T: i64 = 1_700_000_000;

    fn flight(status: &str, sched: i64, real: Option<i64>, est: Option<i64>, ident: &str) -> Flight {
        let code = |iata: &str| AirportRef {
            code: Some(Codes {
                iata: Some(iata.to_string()),
                icao: None,
            }),
        };
        Flight {
            identification: Some(Identification {
                number: Some(FlightNumber {
                    default: Some(ident.to_string()),
                }),
            }),
            airline: None,
            airport: Some(RouteAirports {
                origin: Some(code("ORD")),
                destination: Some(code("LAX")),
            }),
            status: Some(FlightStatus {
                generic: Some(GenericStatus {
                    status: Some(StatusText {
                        text: Some(status.to_string()),
                    }),
                }),
            }),
            time: Some(FlightTimes {
                scheduled: Some(TimePair {
                    departure: Some(sched),
                    arrival: None,
                }),
                real: Some(TimePair {
                    departure: real,
                    arrival: None,
                }),
                estimated: Some(TimePair {
                    departure: est,
                    arrival: None,
                }),
            }),
        }
    }

    fn landed(real: i64) -> Flight {
        flight("landed", T, Some(real), None, "UA100")
    }

    fn hubs(entries: Vec<(&str, Vec<Flight>)>) -> FlightsByHub {
        entries
            .into_iter()
            .map(|(hub, flights)| (hub.to_string(), flights))
            .collect()
    }

    #[test]
    fn empty_input_scores_zero() {
        let result = compute_metrics(FlightsByHub::new());
        assert_eq!(result.score, 0.0);
        assert_eq!(result.total_flights, 0);
        assert_eq!(result.cancellations, 0);
        assert_eq!(result.delayed30, 0);
        assert_eq!(result.delayed60, 0);
        assert_eq!(result.diversions, 0);
        assert!(result.worst_delays.is_empty());
        assert!(result.hub_metrics.is_empty());
    }

    #[test]
    fn hub_without_flights() {
        let result = compute_metrics(hubs(vec![("ORD", vec![])]));
        assert_eq!(result.score, 0.0);
        assert_eq!(result.hub_metrics["ORD"].total, 0);
    }

    #[test]
    fn small_delays_are_on_time() {
        let result = compute_metrics(hubs(vec![(
            "ORD",
            vec![
                landed(T),
                landed(T + 300),
                flight("departed", T, Some(T + 600), None, "UA101"),
            ],
        )]));
        assert_eq!(result.score, 0.0);
        assert_eq!(result.hub_metrics["ORD"].on_time, 3);
        assert_eq!(result.hub_metrics["ORD"].delayed30, 0);
    }

    #[test]
    fn cancellations_weigh_three() {
        let result = compute_metrics(hubs(vec![(
            "ORD",
            vec![landed(T), flight("canceled", T, None, None, "UA2")],
        )]));
        assert_eq!(result.score, 150.0);
        assert_eq!(result.cancellations, 1);
        assert_eq!(result.hub_metrics["ORD"].cancellations, 1);
    }

    #[test]
    fn british_spelling_counts_as_cancelled() {
        let result = compute_metrics(hubs(vec![(
            "ORD",
            vec![landed(T), flight("Cancelled", T, None, None, "UA2")],
        )]));
        assert_eq!(result.cancellations, 1);
        assert_eq!(result.score, 150.0);
    }

    #[test]
    fn cancelled_flight_with_times_is_not_delayed() {
        let result = compute_metrics(hubs(vec![(
            "ORD",
            vec![flight("canceled", T, Some(T + 7200), None, "UA2")],
        )]));
        assert_eq!(result.delayed30, 0);
        assert_eq!(result.hub_metrics["ORD"].operated, 0);
        assert!(result.worst_delays.is_empty());
    }

    #[test]
    fn hour_late_counts_in_both_buckets() {
        let result = compute_metrics(hubs(vec![("ORD", vec![landed(T + 3700)])]));
        assert_eq!(result.delayed30, 1);
        assert_eq!(result.delayed60, 1);
        assert_eq!(result.score, 300.0);
    }

    #[test]
    fn diversions_are_counted() {
        let result = compute_metrics(hubs(vec![(
            "ORD",
            vec![flight("diverted", T, Some(T), None, "UA3")],
        )]));
        assert_eq!(result.diversions, 1);
        assert_eq!(result.hub_metrics["ORD"].diversions, 1);
        assert_eq!(result.score, 200.0);
    }

    #[test]
    fn scheduled_flights_are_skipped() {
        let result = compute_metrics(hubs(vec![(
            "ORD",
            vec![flight("scheduled", T, None, Some(T + 5000), "UA4")],
        )]));
        let ord = &result.hub_metrics["ORD"];
        assert_eq!(ord.total, 1);
        assert_eq!(ord.operated, 0);
        assert_eq!(ord.on_time, 0);
        assert_eq!(result.delayed30, 0);
    }

    #[test]
    fn moved_flight_uses_estimated_time() {
        let result = compute_metrics(hubs(vec![(
            "ORD",
            vec![flight("en-route", T, None, Some(T + 2400), "UA5")],
        )]));
        assert_eq!(result.delayed30, 1);
        assert_eq!(result.worst_delays[0].delay, 40);
        assert_eq!(result.worst_delays[0].route, "ORD→LAX");
    }

    #[test]
    fn hub_totals_sum_to_network() {
        let result = compute_metrics(hubs(vec![
            ("ORD", vec![landed(T), flight("canceled", T, None, None, "UA2")]),
            ("DEN", vec![flight("landed", T, Some(T + 2500), None, "UA6")]),
        ]));
        assert_eq!(result.hub_metrics["ORD"].total, 2);
        assert_eq!(result.hub_metrics["ORD"].cancellations, 1);
        assert_eq!(result.hub_metrics["DEN"].total, 1);
        assert_eq!(result.hub_metrics["DEN"].delayed30, 1);
        let total: usize = result.hub_metrics.values().map(|m| m.total).sum();
        assert_eq!(result.total_flights, total);
        assert_eq!(result.total_flights, 3);
    }

    #[test]
    fn worst_delays_sorted_and_capped() {
        let flights = (0..12)
            .map(|i| {
                let delay = 20 + i * 5;
                flight("landed", T, Some(T + delay * 60), None, &format!("UA{}", 100 + i))
            })
            .collect();
        let result = compute_metrics(hubs(vec![("ORD", flights)]));

        assert_eq!(result.worst_delays.len(), 8);
        assert_eq!(result.worst_delays[0].delay, 75);
        assert_eq!(result.worst_delays[0].ident, "UA111");
        assert_eq!(result.worst_delays[7].delay, 40);
        assert!(result.worst_delays.windows(2).all(|w| w[0].delay > w[1].delay));
    }

    #[test]
    fn serializes_camel_case_fields() {
        let result = compute_metrics(hubs(vec![("ORD", vec![landed(T)])]));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["totalFlights"], 1);
        assert_eq!(json["hubMetrics"]["ORD"]["onTime"], 1);
        assert!(json["generatedAt"].as_str().unwrap().contains('T'));
        assert!(json["hubFlights"]["ORD"].is_array());
    }
}
