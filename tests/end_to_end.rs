//! End-to-end tests against a live server on an ephemeral port.

use base64::Engine as _;
use gozzmock::{Dispatcher, ExpectationStore, JsTemplateEvaluator, MockServer, ReqwestTransport};
use std::net::SocketAddr;
use std::sync::Arc;

const NO_MATCH: &str = "No expectations in gozzmock for request!";

async fn start_server() -> SocketAddr {
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(ExpectationStore::new()),
        Arc::new(JsTemplateEvaluator::new()),
        Arc::new(ReqwestTransport::new().unwrap()),
    ));
    let server = MockServer::bind("127.0.0.1:0".parse().unwrap(), dispatcher)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn add_expectation(client: &reqwest::Client, addr: SocketAddr, json: &str) {
    let response = client
        .post(format!("http://{addr}/gozzmock/add_expectation"))
        .body(json.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200, "add failed for {json}");
}

#[tokio::test]
async fn test_status() {
    let addr = start_server().await;
    let client = reqwest::Client::new();

    for request in [
        client.get(format!("http://{addr}/gozzmock/status")),
        client.post(format!("http://{addr}/gozzmock/status")),
    ] {
        let response = request.send().await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "gozzmock status is OK");
    }
}

#[tokio::test]
async fn test_canned_response_and_no_match() {
    let addr = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/gozzmock/add_expectation"))
        .body(r#"{"key": "k", "request": {"path": "/response"}, "response": {"httpcode": 200, "body": "ok", "headers": {"X-Mock": "yes"}}}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "Expectation with key 'k' was added");

    let response = client
        .get(format!("http://{addr}/response?x=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("x-mock").unwrap(), "yes");
    assert_eq!(response.text().await.unwrap(), "ok");

    let response = client
        .post(format!("http://{addr}/not-registered"))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 501);
    assert_eq!(response.text().await.unwrap(), NO_MATCH);
}

#[tokio::test]
async fn test_template_response() {
    let addr = start_server().await;
    let client = reqwest::Client::new();

    let template = base64::engine::general_purpose::STANDARD.encode("\"123\".length");
    add_expectation(
        &client,
        addr,
        &format!(r#"{{"key": "t", "response": {{"httpcode": 200, "jstemplate": "{template}"}}}}"#),
    )
    .await;

    let response = client
        .get(format!("http://{addr}/anything"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "3");
}

#[tokio::test]
async fn test_template_echoes_request_body() {
    let addr = start_server().await;
    let client = reqwest::Client::new();

    let template = base64::engine::general_purpose::STANDARD
        .encode("JSON.stringify({echo: JSON.parse(request.body).name})");
    add_expectation(
        &client,
        addr,
        &format!(r#"{{"key": "echo", "request": {{"method": "POST"}}, "response": {{"jstemplate": "{template}"}}}}"#),
    )
    .await;

    let response = client
        .post(format!("http://{addr}/echo"))
        .body(r#"{"name": "gozz"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), r#"{"echo":"gozz"}"#);
}

#[tokio::test]
async fn test_priority_and_forwarding() {
    let upstream = start_server().await;
    let mock = start_server().await;
    let client = reqwest::Client::new();

    // Upstream only answers when the forward header was applied
    add_expectation(
        &client,
        upstream,
        r#"{"key": "up", "request": {"path": "/forward", "headers": {"X-Fwd": "added"}}, "response": {"httpcode": 202, "body": "from upstream", "headers": {"X-Upstream": "yes"}}}"#,
    )
    .await;

    add_expectation(
        &client,
        mock,
        r#"{"key": "canned", "request": {"path": "/canned"}, "response": {"body": "canned"}, "priority": 1}"#,
    )
    .await;
    add_expectation(
        &client,
        mock,
        &format!(r#"{{"key": "fwd", "forward": {{"host": "{upstream}", "headers": {{"X-Fwd": "added"}}}}}}"#),
    )
    .await;

    let response = client
        .get(format!("http://{mock}/canned"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "canned");

    let response = client
        .get(format!("http://{mock}/forward"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    assert_eq!(response.headers().get("x-upstream").unwrap(), "yes");
    assert_eq!(response.text().await.unwrap(), "from upstream");

    // Upstream's own no-match answer comes back unchanged
    let response = client
        .get(format!("http://{mock}/elsewhere"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 501);
    assert_eq!(response.text().await.unwrap(), NO_MATCH);
}

#[tokio::test]
async fn test_forward_to_dead_upstream() {
    let mock = start_server().await;
    let client = reqwest::Client::new();

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    add_expectation(
        &client,
        mock,
        &format!(r#"{{"key": "fwd", "forward": {{"host": "{dead}"}}}}"#),
    )
    .await;

    let response = client.get(format!("http://{mock}/x")).send().await.unwrap();
    assert_eq!(response.status(), 500);
    assert_eq!(
        response.text().await.unwrap(),
        "Gozzmock. Something went wrong"
    );
}

#[tokio::test]
async fn test_list_and_remove() {
    let addr = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/gozzmock/get_expectations"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "{}");

    add_expectation(
        &client,
        addr,
        r#"{"key": "a", "request": {"path": "/a"}, "response": {"body": "a"}}"#,
    )
    .await;
    add_expectation(
        &client,
        addr,
        r#"{"key": "b", "response": {"body": "b"}, "priority": 3}"#,
    )
    .await;

    let response = client
        .get(format!("http://{addr}/gozzmock/get_expectations"))
        .send()
        .await
        .unwrap();
    let listed: serde_json::Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(listed["0"]["key"], "b");
    assert_eq!(listed["1"]["key"], "a");

    let response = client
        .post(format!("http://{addr}/gozzmock/remove_expectation"))
        .body(r#"{"key": "b"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "Expectation with key 'b' was removed");

    let response = client.get(format!("http://{addr}/b")).send().await.unwrap();
    assert_eq!(response.status(), 501);
}

#[tokio::test]
async fn test_admin_errors() {
    let addr = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/gozzmock/add_expectation"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    assert_eq!(
        response.text().await.unwrap(),
        "Gozzmock. Something went wrong"
    );

    let response = client
        .post(format!("http://{addr}/gozzmock/add_expectation"))
        .body("{broken")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
}
