//! Lookup pipeline against stub upstreams.

use tle_forwarder::config::UpstreamConfig;
use tle_forwarder::http::HttpStatus;
use tle_forwarder::lookup::{Outcome, QueryIntent, UpstreamFetcher, EMPTY_QUERY_MESSAGE};
use tle_forwarder::LookupService;

mod common;

#[tokio::test]
async fn success_returns_trimmed_body_unmodified() {
    let (addr, recorded) = common::start_programmable_upstream(|_| async {
        (200, format!("\n{}\r\n\r\n", common::ISS_TLE))
    })
    .await;
    let service = common::lookup_service(addr);

    let intent = QueryIntent::from_tokens(["satellite_id=25544"]);
    let result = service.lookup(&intent).await;

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.body, common::ISS_TLE);
    assert_eq!(
        recorded.targets(),
        vec!["/NORAD/elements/gp.php?CATNR=25544&FORMAT=TLE".to_string()]
    );
}

#[tokio::test]
async fn exactly_one_parameter_is_sent_by_precedence() {
    let (addr, recorded) = common::start_fixed_upstream(200, common::ISS_TLE).await;
    let service = common::lookup_service(addr);

    let cases = [
        (vec!["group=stations", "name=ISS", "satellite_id=25544"], "CATNR=25544"),
        (vec!["group=stations", "name=ISS"], "NAME=ISS"),
        (vec!["satellite_id=", "group=stations"], "GROUP=stations"),
    ];
    for (tokens, _) in &cases {
        let result = service.lookup(&QueryIntent::from_tokens(tokens)).await;
        assert_eq!(result.outcome, Outcome::Success);
    }

    let targets = recorded.targets();
    assert_eq!(targets.len(), cases.len());
    for (target, (_, expected)) in targets.iter().zip(&cases) {
        let query = target.split_once('?').unwrap().1;
        let params: Vec<&str> = query.split('&').collect();
        assert_eq!(params, vec![*expected, "FORMAT=TLE"]);
    }
}

#[tokio::test]
async fn empty_intent_never_reaches_upstream() {
    let (addr, recorded) = common::start_fixed_upstream(200, common::ISS_TLE).await;
    let service = common::lookup_service(addr);

    let result = service.lookup(&QueryIntent::from_tokens(["satellite_id=", "foo=bar"])).await;
    assert_eq!(result.outcome, Outcome::EmptyQuery);
    assert_eq!(result.body, EMPTY_QUERY_MESSAGE);

    let response = service.handle::<HttpStatus>(&QueryIntent::default()).await;
    assert_eq!(response.status.as_u16(), 400);

    assert_eq!(recorded.count(), 0);
}

#[tokio::test]
async fn sentinel_body_is_not_found() {
    let (addr, _) = common::start_fixed_upstream(200, "No GP data found").await;
    let service = common::lookup_service(addr);

    let result = service.lookup(&QueryIntent::from_tokens(["satellite_id=99999999"])).await;
    assert_eq!(result.outcome, Outcome::NotFound);
    assert_eq!(result.body, "no TLE data found for the specified parameters");
}

#[tokio::test]
async fn empty_success_body_is_not_found() {
    let (addr, _) = common::start_fixed_upstream(200, "   \r\n").await;
    let service = common::lookup_service(addr);

    let result = service.lookup(&QueryIntent::from_tokens(["name=NOPE"])).await;
    assert_eq!(result.outcome, Outcome::NotFound);
}

#[tokio::test]
async fn upstream_503_is_bad_gateway_not_unavailable() {
    let (addr, recorded) = common::start_fixed_upstream(503, "Service Unavailable").await;
    let service = common::lookup_service(addr);

    let result = service.lookup(&QueryIntent::from_tokens(["group=stations"])).await;
    assert_eq!(result.outcome, Outcome::BadGateway);
    assert_eq!(result.body, "upstream returned status 503");
    assert_eq!(recorded.count(), 1, "no retries");
}

#[tokio::test]
async fn refused_connection_is_service_unavailable() {
    let addr = common::closed_addr().await;
    let service = common::lookup_service(addr);

    let result = service.lookup(&QueryIntent::from_tokens(["satellite_id=25544"])).await;
    assert_eq!(result.outcome, Outcome::ServiceUnavailable);
    assert!(result.body.starts_with("unable to reach upstream"), "{}", result.body);
}

#[tokio::test]
async fn truncated_body_is_internal_error() {
    let addr = common::start_truncating_upstream().await;
    let service = common::lookup_service(addr);

    let result = service.lookup(&QueryIntent::from_tokens(["satellite_id=25544"])).await;
    assert_eq!(result.outcome, Outcome::InternalError);
    assert!(result.body.starts_with("error reading upstream response"), "{}", result.body);
    assert!(!result.body.contains("25544U"), "no partial payload");
}

#[tokio::test]
async fn repeated_lookup_is_idempotent() {
    let (addr, recorded) = common::start_fixed_upstream(200, common::ISS_TLE).await;
    let service = common::lookup_service(addr);
    let intent = QueryIntent::from_tokens(["name=ISS"]);

    let first = service.handle::<HttpStatus>(&intent).await;
    let second = service.handle::<HttpStatus>(&intent).await;

    assert_eq!(first, second);
    assert_eq!(recorded.count(), 2);
    let targets = recorded.targets();
    assert_eq!(targets[0], targets[1]);
}

#[tokio::test]
async fn fetcher_without_selector_still_calls_once() {
    // The fetcher trusts its caller; only the pipeline rejects empty intents.
    let (addr, recorded) = common::start_fixed_upstream(200, common::ISS_TLE).await;
    let fetcher = UpstreamFetcher::new(&common::upstream_config(addr)).unwrap();

    let result = fetcher.fetch(&QueryIntent::default()).await;
    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(
        recorded.targets(),
        vec!["/NORAD/elements/gp.php?FORMAT=TLE".to_string()]
    );

    let service = LookupService::with_fetcher(fetcher);
    assert_eq!(service.lookup(&QueryIntent::default()).await.outcome, Outcome::EmptyQuery);
    assert_eq!(recorded.count(), 1);
}

#[tokio::test]
async fn total_deadline_during_body_is_service_unavailable() {
    let addr = common::start_stalling_upstream().await;
    let config = UpstreamConfig {
        timeout_secs: 1,
        ..common::upstream_config(addr)
    };
    let service = LookupService::new(&config).unwrap();

    let result = service.lookup(&QueryIntent::from_tokens(["satellite_id=25544"])).await;
    assert_eq!(result.outcome, Outcome::ServiceUnavailable);
    assert!(result.body.starts_with("unable to reach upstream"), "{}", result.body);
    assert!(!result.body.contains("25544U"), "no partial payload");
}
