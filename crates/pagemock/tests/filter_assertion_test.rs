// FilterView and AssertionChain tests
//
// Covers lazy evaluation, predicate commutativity, single-read body
// caching, and the deferred pass/fail semantics of the assertion chain.

mod harness;

use harness::FakePage;
use pagemock::{BodySource, Error, MockOptions, RequestInfo, ResponseEvent, ResponseSpec};
use regex::Regex;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn mock_json_api(page: &FakePage) {
    page.session
        .mock(
            Regex::new("/api").unwrap(),
            MockOptions::builder()
                .response(
                    ResponseSpec::builder()
                        .json(&json!({"result": "MOCK"}))
                        .unwrap()
                        .build(),
                )
                .build(),
        )
        .unwrap();
}

#[tokio::test]
async fn filter_narrows_by_url_and_response_body() {
    // Scenario: mock /api with {result:"MOCK"}, fetch it, filter.
    let page = FakePage::new();
    mock_json_api(&page);
    page.drive_get("https://host/api").await;
    page.drive_get("https://host/other").await;

    let hits = page
        .session
        .filter()
        .url(Regex::new("/api").unwrap())
        .resolve()
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);

    let hits = page
        .session
        .filter()
        .url(Regex::new("/api").unwrap())
        .response_body(json!({"result": "MOCK"}))
        .resolve()
        .await
        .unwrap();
    assert!(!hits.is_empty());
}

#[tokio::test]
async fn independent_predicates_commute() {
    let page = FakePage::new();
    page.drive_get("https://host/api").await;
    page.drive(RequestInfo::new("https://host/api", "POST")).await;
    page.drive_get("https://host/other").await;

    let url_then_method: Vec<u64> = page
        .session
        .filter()
        .url(Regex::new("/api").unwrap())
        .method("GET")
        .resolve()
        .await
        .unwrap()
        .iter()
        .map(|r| r.id())
        .collect();
    let method_then_url: Vec<u64> = page
        .session
        .filter()
        .method("GET")
        .url(Regex::new("/api").unwrap())
        .resolve()
        .await
        .unwrap()
        .iter()
        .map(|r| r.id())
        .collect();

    assert_eq!(url_then_method, method_then_url);
    assert_eq!(url_then_method.len(), 1);
}

#[tokio::test]
async fn views_sharing_an_upstream_are_independent() {
    let page = FakePage::new();
    page.drive_get("/a").await;
    page.drive(RequestInfo::new("/b", "POST")).await;

    let base = page.session.filter();
    let gets = base.method("GET");
    let posts = base.method("POST");

    assert_eq!(gets.resolve().await.unwrap().len(), 1);
    assert_eq!(posts.resolve().await.unwrap().len(), 1);
    // The base view is untouched by derived views.
    assert_eq!(base.resolve().await.unwrap().len(), 2);
}

#[tokio::test]
async fn predicates_cover_response_metadata() {
    let page = FakePage::new();
    page.session
        .mock(
            "/api",
            MockOptions::builder()
                .response(
                    ResponseSpec::builder()
                        .status(503)
                        .content_type("text/plain")
                        .body_string("down")
                        .build(),
                )
                .build(),
        )
        .unwrap();
    page.drive_get("/api").await;
    let (_, _rx) = page.get("/still-pending");

    let session = &page.session;
    assert_eq!(session.filter().status(503).resolve().await.unwrap().len(), 1);
    assert_eq!(session.filter().ok(false).resolve().await.unwrap().len(), 1);
    assert_eq!(
        session
            .filter()
            .header("content-type", "text/plain")
            .resolve()
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(session.filter().pending(true).resolve().await.unwrap().len(), 1);
    assert_eq!(
        session
            .filter()
            .resource_type("fetch")
            .resolve()
            .await
            .unwrap()
            .len(),
        2
    );
    assert_eq!(
        session
            .filter()
            .from_cache(false)
            .resolve()
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn request_body_predicate_matches_structurally() {
    let page = FakePage::new();
    page.drive(
        RequestInfo::new("/api", "POST").with_post_data("{\"n\": 1, \"tag\": \"x\"}"),
    )
    .await;

    let hits = page
        .session
        .filter()
        .request_body(json!({"tag": "x", "n": 1}))
        .resolve()
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn response_body_is_read_once_across_views() {
    let page = FakePage::new();
    let (captured, _rx) = page.get("/api");

    let reads = Arc::new(AtomicUsize::new(0));
    let reads_clone = reads.clone();
    let source: BodySource = Box::pin(async move {
        reads_clone.fetch_add(1, Ordering::SeqCst);
        Ok(bytes::Bytes::from_static(b"{\"result\":\"MOCK\"}"))
    });
    page.session
        .handle_response(
            captured.id(),
            ResponseEvent::new(200).with_body_source(source),
        )
        .unwrap();

    let view = page.session.filter().response_body(json!({"result": "MOCK"}));
    assert_eq!(view.resolve().await.unwrap().len(), 1);
    assert_eq!(view.resolve().await.unwrap().len(), 1);
    let other = page.session.filter().response_body("{\"result\":\"MOCK\"}");
    assert_eq!(other.resolve().await.unwrap().len(), 1);

    assert_eq!(reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn assertion_chain_passes_and_narrows() {
    let page = FakePage::new();
    mock_json_api(&page);
    page.drive_get("https://host/api").await;

    let hits = page
        .session
        .assert_requests()
        .url(Regex::new("/api").unwrap(), None)
        .await
        .method("GET", None)
        .await
        .response_body(json!({"result": "MOCK"}), None)
        .await
        .check()
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn assertion_chain_is_awaitable_directly() {
    let page = FakePage::new();
    page.drive_get("/api").await;

    // IntoFuture: awaiting the chain itself resolves it.
    let hits = page
        .session
        .assert_requests()
        .url("/api", None)
        .await
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn empty_result_fails_with_criteria_echoed() {
    let page = FakePage::new();
    page.drive_get("/api").await;

    let err = page
        .session
        .assert_requests()
        .url("/nope", None)
        .await
        .check()
        .await
        .unwrap_err();
    match err {
        Error::Assertion {
            message, actual, ..
        } => {
            assert!(message.contains("/nope"));
            assert_eq!(actual, "0");
        }
        other => panic!("expected assertion failure, got {:?}", other),
    }
}

#[tokio::test]
async fn custom_message_replaces_default_text() {
    let page = FakePage::new();
    let err = page
        .session
        .assert_requests()
        .url("/nope", Some("the login call never happened"))
        .await
        .check()
        .await
        .unwrap_err();
    match err {
        Error::Assertion { message, .. } => {
            assert_eq!(message, "the login call never happened");
        }
        other => panic!("expected assertion failure, got {:?}", other),
    }
}

#[tokio::test]
async fn exactly_zero_tolerates_upstream_empty_failure() {
    // Scenario: .url("/nope") alone rejects, but .exactly(0) on the same
    // chain succeeds - an empty set is a legitimate "exactly 0".
    let page = FakePage::new();
    page.drive_get("/api").await;

    let hits = page
        .session
        .assert_requests()
        .url("/nope", None)
        .await
        .exactly(0, None)
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn exactly_reports_expected_and_actual_counts() {
    let page = FakePage::new();
    page.drive_get("/api").await;
    page.drive_get("/api").await;

    let err = page
        .session
        .assert_requests()
        .url("/api", None)
        .await
        .exactly(3, None)
        .await
        .unwrap_err();
    match err {
        Error::Assertion {
            expected, actual, ..
        } => {
            assert_eq!(expected, "3");
            assert_eq!(actual, "2");
        }
        other => panic!("expected assertion failure, got {:?}", other),
    }
}

#[tokio::test]
async fn failed_chain_performs_no_further_body_reads() {
    let page = FakePage::new();
    let (captured, _rx) = page.get("/api");

    let reads = Arc::new(AtomicUsize::new(0));
    let reads_clone = reads.clone();
    let source: BodySource = Box::pin(async move {
        reads_clone.fetch_add(1, Ordering::SeqCst);
        Ok(bytes::Bytes::from_static(b"{}"))
    });
    page.session
        .handle_response(
            captured.id(),
            ResponseEvent::new(200).with_body_source(source),
        )
        .unwrap();

    let err = page
        .session
        .assert_requests()
        .url("/nope", None)
        .await
        .response_body(json!({}), None)
        .await
        .check()
        .await
        .unwrap_err();
    assert!(err.is_assertion());
    assert_eq!(reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn mock_scoped_assertions() {
    let page = FakePage::new();
    let mock = page
        .session
        .mock("/api", MockOptions::builder().method("POST").build())
        .unwrap();
    page.drive(
        RequestInfo::new("/api", "POST").with_post_data("{\"name\":\"jo\"}"),
    )
    .await;

    mock.assert().called(None, None).unwrap();
    mock.assert().called(Some(1), None).unwrap();
    mock.assert().post_body(json!({"name": "jo"}), None).unwrap();

    let err = mock.assert().called(Some(2), None).unwrap_err();
    assert!(err.is_assertion());
    let err = mock
        .assert()
        .post_body("something else", Some("wrong payload"))
        .unwrap_err();
    match err {
        Error::Assertion { message, .. } => assert_eq!(message, "wrong payload"),
        other => panic!("expected assertion failure, got {:?}", other),
    }
}
