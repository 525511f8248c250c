use blueboard_irrops::api::{Direction, ScheduleProvider, ScheduleQuery, ScheduleSource};
use blueboard_irrops::config::UpstreamConfig;
use blueboard_irrops::error::FetchError;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DAY_START: i64 = 1_700_000_000;
const BOARD_PATH: &str = "/common/v1/airport.json";

fn provider(server: &MockServer) -> ScheduleProvider {
    provider_with_page_delay(server, 0)
}

fn provider_with_page_delay(server: &MockServer, inter_page_delay_ms: u64) -> ScheduleProvider {
    ScheduleProvider::new(&UpstreamConfig {
        base_url: server.uri(),
        retries: 0,
        error_backoff_ms: 0,
        throttle_backoff_ms: 0,
        inter_page_delay_ms,
        ..UpstreamConfig::default()
    })
    .unwrap()
}

fn query(direction: Direction, max_pages: u32) -> ScheduleQuery {
    ScheduleQuery {
        hub: "ORD".to_string(),
        direction,
        day_start: DAY_START,
        max_pages,
    }
}

fn flight(ident: &str, operator: &str, departure: i64) -> Value {
    json!({
        "flight": {
            "identification": { "number": { "default": ident } },
            "airline": { "code": { "iata": operator } },
            "time": { "scheduled": { "departure": departure, "arrival": departure + 3600 } }
        }
    })
}

fn page(board: &str, current: u32, total: u32, data: Vec<Value>) -> Value {
    json!({
        "result": { "response": { "airport": { "pluginData": { "schedule": {
            board: { "page": { "current": current, "total": total }, "data": data }
        }}}}}
    })
}

async fn mount_page(server: &MockServer, n: u32, body: Value) {
    Mock::given(method("GET"))
        .and(path(BOARD_PATH))
        .and(query_param("page", n.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn idents(flights: &[blueboard_irrops::models::Flight]) -> Vec<&str> {
    flights.iter().filter_map(|f| f.ident()).collect()
}

#[tokio::test]
async fn stops_paging_once_the_day_ends() {
    let server = MockServer::start().await;
    let t = DAY_START + 3600;

    mount_page(&server, 1, page("departures", 1, 6, vec![flight("UA1", "UA", t)])).await;
    mount_page(&server, 2, page("departures", 2, 6, vec![flight("UA2", "UA", t + 60)])).await;
    mount_page(
        &server,
        3,
        page(
            "departures",
            3,
            6,
            vec![flight("UA3", "UA", t + 120), flight("UA4", "UA", DAY_START + 86_400)],
        ),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(BOARD_PATH))
        .and(query_param("page", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page("departures", 4, 6, vec![])))
        .expect(0)
        .mount(&server)
        .await;

    let schedule = provider(&server)
        .fetch_hub_schedule(&query(Direction::Departures, 5))
        .await;

    assert!(schedule.failure.is_none());
    assert_eq!(idents(&schedule.flights), vec!["UA1", "UA2", "UA3"]);
    assert_eq!(schedule.pages_scanned, 3);
    assert_eq!(schedule.total_pages, 6);
    assert_eq!(schedule.total_fetched, 4);
}

#[tokio::test]
async fn keeps_only_the_configured_operator() {
    let server = MockServer::start().await;
    let t = DAY_START + 600;

    mount_page(
        &server,
        1,
        page(
            "departures",
            1,
            1,
            vec![
                flight("UA10", "UA", t),
                flight("AA20", "AA", t + 60),
                json!({ "flight": null }),
                flight("UA11", "UA", t + 120),
            ],
        ),
    )
    .await;

    let schedule = provider(&server)
        .fetch_hub_schedule(&query(Direction::Departures, 5))
        .await;

    assert_eq!(idents(&schedule.flights), vec!["UA10", "UA11"]);
    assert_eq!(schedule.total_fetched, 4);
    assert_eq!(schedule.pages_scanned, 1);
}

#[tokio::test]
async fn foreign_flight_past_day_end_does_not_stop_the_scan() {
    let server = MockServer::start().await;
    let t = DAY_START + 600;

    mount_page(
        &server,
        1,
        page(
            "departures",
            1,
            2,
            vec![flight("AA1", "AA", DAY_START + 90_000), flight("UA1", "UA", t)],
        ),
    )
    .await;
    mount_page(&server, 2, page("departures", 2, 2, vec![flight("UA2", "UA", t + 60)])).await;

    let schedule = provider(&server)
        .fetch_hub_schedule(&query(Direction::Departures, 5))
        .await;

    assert_eq!(idents(&schedule.flights), vec!["UA1", "UA2"]);
    assert_eq!(schedule.pages_scanned, 2);
}

#[tokio::test]
async fn empty_board_ends_the_scan() {
    let server = MockServer::start().await;

    mount_page(&server, 1, page("departures", 1, 3, vec![])).await;
    Mock::given(method("GET"))
        .and(path(BOARD_PATH))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let schedule = provider(&server)
        .fetch_hub_schedule(&query(Direction::Departures, 5))
        .await;

    assert!(schedule.flights.is_empty());
    assert!(schedule.failure.is_none());
    assert_eq!(schedule.pages_scanned, 0);
}

#[tokio::test]
async fn honours_the_page_cap() {
    let server = MockServer::start().await;
    let t = DAY_START + 600;

    for n in 1..=2 {
        mount_page(
            &server,
            n,
            page("departures", n, 9, vec![flight(&format!("UA{}", n), "UA", t)]),
        )
        .await;
    }
    Mock::given(method("GET"))
        .and(path(BOARD_PATH))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let schedule = provider(&server)
        .fetch_hub_schedule(&query(Direction::Departures, 2))
        .await;

    assert_eq!(idents(&schedule.flights), vec!["UA1", "UA2"]);
    assert_eq!(schedule.total_pages, 9);
}

#[tokio::test]
async fn page_error_keeps_earlier_pages() {
    let server = MockServer::start().await;
    let t = DAY_START + 600;

    mount_page(&server, 1, page("departures", 1, 3, vec![flight("UA1", "UA", t)])).await;
    Mock::given(method("GET"))
        .and(path(BOARD_PATH))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let schedule = provider(&server)
        .fetch_hub_schedule(&query(Direction::Departures, 5))
        .await;

    assert_eq!(idents(&schedule.flights), vec!["UA1"]);
    assert_eq!(schedule.failure, Some(FetchError::Status(503)));
    assert_eq!(schedule.pages_scanned, 1);
}

#[tokio::test]
async fn arrivals_use_the_arrivals_board_and_times() {
    let server = MockServer::start().await;

    // Departs before the day ends but lands after it.
    let late = DAY_START + 86_400 - 1800;
    Mock::given(method("GET"))
        .and(path(BOARD_PATH))
        .and(query_param("plugin-setting[schedule][mode]", "arrivals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            "arrivals",
            1,
            1,
            vec![flight("UA7", "UA", DAY_START + 600), flight("UA8", "UA", late)],
        )))
        .mount(&server)
        .await;

    let schedule = provider(&server)
        .fetch_hub_schedule(&query(Direction::Arrivals, 5))
        .await;

    assert_eq!(idents(&schedule.flights), vec!["UA7"]);
}

#[tokio::test]
async fn malformed_body_is_a_decode_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(BOARD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>blocked</html>"))
        .mount(&server)
        .await;

    let schedule = provider(&server)
        .fetch_hub_schedule(&query(Direction::Departures, 5))
        .await;

    assert!(schedule.flights.is_empty());
    assert!(matches!(schedule.failure, Some(FetchError::Decode(_))));
}

#[tokio::test]
async fn waits_between_pages() {
    let server = MockServer::start().await;
    let t = DAY_START + 600;

    for n in 1..=3 {
        mount_page(
            &server,
            n,
            page("departures", n, 3, vec![flight(&format!("UA{}", n), "UA", t)]),
        )
        .await;
    }

    let started = Instant::now();
    let schedule = provider_with_page_delay(&server, 250)
        .fetch_hub_schedule(&query(Direction::Departures, 5))
        .await;
    let elapsed = started.elapsed();

    assert_eq!(schedule.pages_scanned, 3);
    // Two gaps for three pages, none after the last.
    assert!(elapsed >= Duration::from_millis(500), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "{:?}", elapsed);
}

#[tokio::test]
async fn stalled_body_is_a_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let head = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 1000\r\n\r\n{";
        socket.write_all(head.as_bytes()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let provider = ScheduleProvider::new(&UpstreamConfig {
        base_url: format!("http://{}", addr),
        retries: 0,
        request_timeout_ms: 300,
        inter_page_delay_ms: 0,
        ..UpstreamConfig::default()
    })
    .unwrap();
    let schedule = provider
        .fetch_hub_schedule(&query(Direction::Departures, 5))
        .await;

    assert!(schedule.flights.is_empty());
    assert_eq!(schedule.failure, Some(FetchError::Timeout));
}
