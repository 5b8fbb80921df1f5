//! End-to-end facade behavior: dispatch, diagnostics, and redirects.

use std::sync::Arc;
use std::time::Duration;

use http::Method;
use serde_json::json;

use fetch_mock::{
    FetchError, FetchMocker, MockServer, RedirectMode, RequestInit, RequestPattern,
    ResponsePattern, ResponseProducer,
};

fn server(base: &str) -> Arc<MockServer> {
    Arc::new(MockServer::new(base).unwrap())
}

fn mocker(servers: Vec<Arc<MockServer>>) -> FetchMocker {
    FetchMocker::builder().servers(servers).build().unwrap()
}

#[tokio::test]
async fn hello_world_round_trip() {
    let api = server("https://api.example.com");
    api.get(
        "/hello",
        ResponsePattern::new(200).unwrap().set_body("Hello world!"),
    )
    .unwrap();
    let mocker = mocker(vec![api]);

    let response = mocker.fetch("https://api.example.com/hello").await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text(), "Hello world!");
    assert!(mocker.all_routes_called());

    // The route is one-shot: the identical fetch now misses.
    let err = mocker
        .fetch("https://api.example.com/hello")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::NoRouteMatched(_)));
    assert!(err.to_string().contains("No route matched"));
}

#[tokio::test]
async fn miss_reports_each_partial_match() {
    let api = server("https://api.example.com");
    api.get(
        RequestPattern::new("/user/:id").set_param("id", "1"),
        200,
    )
    .unwrap();
    api.get(
        RequestPattern::new("/user/settings").set_query("page", "profile"),
        200,
    )
    .unwrap();
    let mocker = mocker(vec![api]);

    let err = mocker
        .fetch("https://api.example.com/user/settings")
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Partial matches:"));
    assert!(message.contains("Expected id=1"));
    assert!(message.contains("Expected page=profile"));
}

#[tokio::test]
async fn pure_url_misses_are_not_reported() {
    let api = server("https://api.example.com");
    api.get("/somewhere/else", 200).unwrap();
    let mocker = mocker(vec![api]);

    let err = mocker
        .fetch("https://api.example.com/user/settings")
        .await
        .unwrap_err();
    assert!(!err.to_string().contains("Partial matches:"));
}

#[tokio::test]
async fn relative_urls_resolve_against_the_base() {
    let api = server("https://api.example.com");
    api.get("/hello", 200).unwrap();
    let mocker = FetchMocker::builder()
        .server(api)
        .base_url("https://api.example.com")
        .build()
        .unwrap();

    let response = mocker.fetch("/hello").await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn servers_are_consulted_in_order() {
    let first = server("https://api.example.com");
    let second = server("https://api.example.com");
    first.get("/a", 201).unwrap();
    second.get("/a", 202).unwrap();
    let mocker = mocker(vec![first, second]);

    let response = mocker.fetch("https://api.example.com/a").await.unwrap();
    assert_eq!(response.status(), 201);

    // The first server's route is consumed; the second now answers.
    let response = mocker.fetch("https://api.example.com/a").await.unwrap();
    assert_eq!(response.status(), 202);
}

#[tokio::test]
async fn creator_functions_see_cookies_params_and_query() {
    let api = server("https://api.example.com");
    api.get(
        "/user/:id",
        ResponseProducer::from_fn(|_request, context| {
            assert_eq!(context.query, vec![("tab".to_string(), "posts".to_string())]);
            ResponsePattern::new(200)
                .unwrap()
                .set_body(format!("user {}", context.params["id"]))
        }),
    )
    .unwrap();
    let mocker = mocker(vec![api]);

    let response = mocker
        .fetch("https://api.example.com/user/12?tab=posts")
        .await
        .unwrap();
    assert_eq!(response.text(), "user 12");
}

#[tokio::test(start_paused = true)]
async fn delayed_responses_wait() {
    let api = server("https://api.example.com");
    api.get(
        "/slow",
        ResponsePattern::new(200)
            .unwrap()
            .set_delay(Duration::from_millis(500)),
    )
    .unwrap();
    let mocker = mocker(vec![api]);

    let started = tokio::time::Instant::now();
    mocker.fetch("https://api.example.com/slow").await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(500));
}

#[tokio::test]
async fn post_body_redirect_round_trip() {
    let api = server("https://api.example.com");
    api.post(
        "/original",
        ResponsePattern::new(307)
            .unwrap()
            .set_header("location", "/redirected"),
    )
    .unwrap();
    api.post(
        RequestPattern::new("/redirected").set_body(json!({"data": "test"})),
        ResponsePattern::new(200)
            .unwrap()
            .set_body(r#"Got request with body: {"data":"test"}"#),
    )
    .unwrap();
    let mocker = FetchMocker::builder()
        .server(api)
        .base_url("https://api.example.com")
        .build()
        .unwrap();

    let response = mocker
        .fetch_with(
            "/original",
            RequestInit::default()
                .set_method(Method::POST)
                .set_json(&json!({"data": "test"})),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text(), r#"Got request with body: {"data":"test"}"#);
    assert!(response.redirected());
    assert_eq!(
        response.url().unwrap().as_str(),
        "https://api.example.com/redirected"
    );
}

#[tokio::test]
async fn see_other_rewrites_the_follow_up_to_get() {
    let api = server("https://api.example.com");
    api.post(
        "/submit",
        ResponsePattern::new(303)
            .unwrap()
            .set_header("location", "/done"),
    )
    .unwrap();
    api.get("/done", 200).unwrap();
    let mocker = mocker(vec![api]);

    let response = mocker
        .fetch_with(
            "https://api.example.com/submit",
            RequestInit::default()
                .set_method(Method::POST)
                .set_body("payload"),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.redirected());
}

#[tokio::test]
async fn manual_redirect_mode_returns_an_opaque_redirect() {
    let api = server("https://api.example.com");
    api.get(
        "/moved",
        ResponsePattern::new(301)
            .unwrap()
            .set_header("location", "/elsewhere"),
    )
    .unwrap();
    let mocker = mocker(vec![api]);

    let response = mocker
        .fetch_with(
            "https://api.example.com/moved",
            RequestInit::default().set_redirect(RedirectMode::Manual),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 0);
    assert_eq!(
        response.url().unwrap().as_str(),
        "https://api.example.com/moved"
    );
}

#[tokio::test]
async fn error_redirect_mode_raises() {
    let api = server("https://api.example.com");
    api.get(
        "/moved",
        ResponsePattern::new(302)
            .unwrap()
            .set_header("location", "/elsewhere"),
    )
    .unwrap();
    let mocker = mocker(vec![api]);

    let err = mocker
        .fetch_with(
            "https://api.example.com/moved",
            RequestInit::default().set_redirect(RedirectMode::Error),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::RedirectNotAllowed(_)));
}

#[tokio::test]
async fn redirect_cycles_are_detected() {
    let api = server("https://api.example.com");
    api.get(
        "/a",
        ResponsePattern::new(302).unwrap().set_header("location", "/b"),
    )
    .unwrap();
    api.get(
        "/b",
        ResponsePattern::new(302).unwrap().set_header("location", "/a"),
    )
    .unwrap();
    let mocker = mocker(vec![api]);

    // The loop check trips before /a is dispatched a second time.
    let err = mocker.fetch("https://api.example.com/a").await.unwrap_err();
    assert!(matches!(err, FetchError::RedirectLoop(_)));
}

#[tokio::test]
async fn bounded_chains_resolve_and_longer_ones_fail() {
    let api = server("https://api.example.com");
    for i in 0..5 {
        api.get(
            format!("/hop/{i}"),
            ResponsePattern::new(302)
                .unwrap()
                .set_header("location", format!("/hop/{}", i + 1)),
        )
        .unwrap();
    }
    api.get("/hop/5", 200).unwrap();
    let mocker = mocker(vec![api]);

    let response = mocker.fetch("https://api.example.com/hop/0").await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.redirected());
}

#[tokio::test]
async fn uncalled_routes_lists_display_titles() {
    let api = server("https://api.example.com");
    api.get("/called", 200).unwrap();
    api.post("/never", 201).unwrap();
    let mocker = mocker(vec![api]);

    mocker.fetch("https://api.example.com/called").await.unwrap();
    assert!(mocker.called("/called"));
    assert_eq!(
        mocker.uncalled_routes(),
        vec!["POST https://api.example.com/never".to_string()]
    );
    assert!(!mocker.all_routes_called());
}

#[tokio::test]
async fn clear_all_resets_servers() {
    let api = server("https://api.example.com");
    api.get("/x", 200).unwrap();
    let mocker = mocker(vec![api]);

    mocker.clear_all();
    assert!(mocker.all_routes_called());
    let err = mocker.fetch("https://api.example.com/x").await.unwrap_err();
    assert!(matches!(err, FetchError::NoRouteMatched(_)));
}
