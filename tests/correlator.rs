mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeDriver, response};
use resilient_locator::{
    CorrelationError, CorrelationOutcome, DriverError, ResponsePredicate, arm, await_matching,
    await_successful,
};

fn upload() -> ResponsePredicate {
    ResponsePredicate::methods(["POST"]).and(ResponsePredicate::url_contains("upload"))
}

#[tokio::test]
async fn unrelated_responses_are_skipped() {
    let driver = FakeDriver::new().with_body("2", Ok(r#"{"id":7}"#.to_string()));

    let pending = arm(&driver, upload()).await.unwrap();
    driver.emit(response("1", "GET", "https://app.test/ping", 200));
    driver.emit(response("2", "POST", "https://app.test/api/upload", 201));

    let outcome = pending.wait(Duration::from_secs(1)).await.unwrap();
    assert_eq!(
        outcome,
        CorrelationOutcome::Matched {
            status: 201,
            method: "POST".to_string(),
            url: "https://app.test/api/upload".to_string(),
            body: r#"{"id":7}"#.to_string(),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn response_arriving_during_the_wait_is_matched() {
    let driver = Arc::new(FakeDriver::new());
    let emitter = Arc::clone(&driver);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        emitter.emit(response("9", "PUT", "https://app.test/forms/3/save", 204));
    });

    let outcome = await_matching(
        driver.as_ref(),
        ResponsePredicate::url_contains("/save"),
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    assert_eq!(outcome.status(), Some(204));
}

#[tokio::test(start_paused = true)]
async fn never_matching_predicate_times_out() {
    let driver = FakeDriver::new();
    let timeout = Duration::from_millis(300);

    let pending = arm(&driver, ResponsePredicate::new(|_, _| false)).await.unwrap();
    driver.emit(response("1", "POST", "https://app.test/api/upload", 201));

    let started = tokio::time::Instant::now();
    let outcome = pending.wait(timeout).await.unwrap();

    assert_eq!(outcome, CorrelationOutcome::TimedOut);
    assert!(started.elapsed() >= timeout);
    assert!(started.elapsed() < timeout + Duration::from_millis(50));
}

#[tokio::test]
async fn non_success_status_is_an_error_for_await_successful() {
    let driver = FakeDriver::new();
    let pending = arm(&driver, upload()).await.unwrap();
    driver.emit(response("1", "POST", "https://app.test/api/upload", 404));

    let err = pending
        .wait_successful(Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CorrelationError::UnexpectedStatus { status: 404, .. }
    ));
}

#[tokio::test]
async fn non_success_status_is_still_matched_by_plain_wait() {
    let driver = FakeDriver::new();
    let pending = arm(&driver, upload()).await.unwrap();
    driver.emit(response("1", "POST", "https://app.test/api/upload", 500));

    let outcome = pending.wait(Duration::from_secs(1)).await.unwrap();
    assert_eq!(outcome.status(), Some(500));
}

#[tokio::test(start_paused = true)]
async fn await_successful_times_out_quietly() {
    let driver = FakeDriver::new();
    let outcome = await_successful(&driver, upload(), Duration::from_millis(100))
        .await
        .unwrap();
    assert!(!outcome.is_matched());
}

#[tokio::test]
async fn unreadable_body_becomes_empty() {
    let driver = FakeDriver::new().with_body(
        "1",
        Err(DriverError::Read("No resource with given identifier".into())),
    );
    let pending = arm(&driver, upload()).await.unwrap();
    driver.emit(response("1", "POST", "https://app.test/api/upload", 201));

    match pending.wait(Duration::from_secs(1)).await.unwrap() {
        CorrelationOutcome::Matched { status, body, .. } => {
            assert_eq!(status, 201);
            assert!(body.is_empty());
        }
        CorrelationOutcome::TimedOut => panic!("expected a match"),
    }
}

#[tokio::test(start_paused = true)]
async fn body_still_downloading_is_waited_for() {
    let driver = FakeDriver::new()
        .with_body("1", Ok("%PDF-1.4 ...".to_string()))
        .with_body_delay(Duration::from_secs(8));
    let pending = arm(&driver, upload()).await.unwrap();
    driver.emit(response("1", "POST", "https://app.test/api/upload", 201));

    match pending.wait(Duration::from_secs(1)).await.unwrap() {
        CorrelationOutcome::Matched { body, .. } => assert_eq!(body, "%PDF-1.4 ..."),
        CorrelationOutcome::TimedOut => panic!("expected a match"),
    }
}

#[tokio::test(start_paused = true)]
async fn body_that_never_arrives_becomes_empty() {
    let driver = FakeDriver::new()
        .with_body("1", Ok("late".to_string()))
        .with_body_delay(Duration::from_secs(600));
    let pending = arm(&driver, upload()).await.unwrap();
    driver.emit(response("1", "POST", "https://app.test/api/upload", 201));

    let outcome = pending.wait(Duration::from_secs(1)).await.unwrap();
    assert_eq!(
        outcome,
        CorrelationOutcome::Matched {
            status: 201,
            method: "POST".to_string(),
            url: "https://app.test/api/upload".to_string(),
            body: String::new(),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn matches_are_not_retained_between_waits() {
    let driver = FakeDriver::new();
    let pending = arm(&driver, upload()).await.unwrap();
    driver.emit(response("1", "POST", "https://app.test/api/upload", 201));
    driver.emit(response("2", "POST", "https://app.test/api/upload", 202));

    let first = pending.wait(Duration::from_secs(1)).await.unwrap();
    assert_eq!(first.status(), Some(201));

    let second = await_matching(&driver, upload(), Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(second, CorrelationOutcome::TimedOut);
}

#[tokio::test]
async fn closed_session_is_an_error() {
    let driver = FakeDriver::new();
    let pending = arm(&driver, upload()).await.unwrap();
    driver.close_network();

    let err = pending.wait(Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(
        err,
        CorrelationError::Driver(DriverError::SessionClosed(_))
    ));
}

#[tokio::test]
async fn zero_timeout_is_rejected() {
    let driver = FakeDriver::new();
    let err = await_matching(&driver, upload(), Duration::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, CorrelationError::InvalidArguments(_)));
}
