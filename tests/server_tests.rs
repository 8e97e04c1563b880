use serde_json::{json, Value};
use warp::http::StatusCode;

use ls8_emulator::server::{routes, ServerConfig, ServerState};

const MULT: &str = "\
10000010 # LDI R0,8
00000000
00001000
10000010 # LDI R1,9
00000001
00001001
10100010 # MUL R0,R1
00000000
00000001
01000111 # PRN R0
00000000
00000001 # HLT
";

fn state() -> ServerState {
    ServerState::new(ServerConfig {
        max_steps: 1_000,
        ..ServerConfig::default()
    })
}

fn body<B: AsRef<[u8]>>(response: &warp::http::Response<B>) -> Value {
    serde_json::from_slice(response.body().as_ref()).unwrap()
}

#[tokio::test]
async fn test_run_program() {
    let filter = routes(state());

    let response = warp::test::request()
        .method("POST")
        .path("/run")
        .json(&json!({ "image": MULT }))
        .reply(&filter)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let value = body(&response);
    assert_eq!(value["success"], true);
    assert_eq!(value["data"]["output"], json!(["72"]));
    assert_eq!(value["data"]["halted"], true);
    assert_eq!(value["data"]["steps_executed"], 5);
    assert_eq!(value["data"]["fault"], Value::Null);
}

#[tokio::test]
async fn test_run_reports_faults_and_bad_images() {
    let filter = routes(state());

    let response = warp::test::request()
        .method("POST")
        .path("/run")
        .json(&json!({ "image": "01010100\n00000000\n", "max_steps": 20 }))
        .reply(&filter)
        .await;
    let value = body(&response);
    assert_eq!(value["data"]["halted"], false);
    assert_eq!(value["data"]["steps_executed"], 20);
    assert!(value["data"]["fault"].as_str().unwrap().contains("step limit"));

    let response = warp::test::request()
        .method("POST")
        .path("/run")
        .json(&json!({ "image": "hello" }))
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body(&response)["success"], false);
}

#[tokio::test]
async fn test_stepping_session_with_snapshot() {
    let filter = routes(state());

    let response = warp::test::request()
        .method("POST")
        .path("/machine")
        .json(&json!({ "image": MULT }))
        .reply(&filter)
        .await;
    let id = body(&response)["data"]["id"].as_str().unwrap().to_string();

    let response = warp::test::request()
        .method("POST")
        .path(&format!("/machine/{}/step", id))
        .reply(&filter)
        .await;
    assert_eq!(body(&response)["data"]["final_state"]["pc"], 3);

    let response = warp::test::request()
        .method("POST")
        .path(&format!("/machine/{}/snapshot", id))
        .reply(&filter)
        .await;
    let snapshot_id = body(&response)["data"]["id"].as_str().unwrap().to_string();

    let response = warp::test::request()
        .method("POST")
        .path(&format!("/machine/{}/execute", id))
        .json(&json!({ "steps": 10 }))
        .reply(&filter)
        .await;
    let value = body(&response);
    assert_eq!(value["data"]["steps_executed"], 4);
    assert_eq!(value["data"]["halted"], true);
    assert_eq!(value["data"]["output"], json!(["72"]));

    let response = warp::test::request()
        .method("POST")
        .path(&format!("/machine/{}/restore", id))
        .json(&json!({ "snapshot_id": snapshot_id }))
        .reply(&filter)
        .await;
    let value = body(&response);
    assert_eq!(value["data"]["cpu"]["pc"], 3);
    assert_eq!(value["data"]["cpu"]["halted"], false);
    assert_eq!(value["data"]["cpu"]["registers"][0], 8);

    let response = warp::test::request()
        .method("GET")
        .path(&format!("/machine/{}/memory?address=0&length=3", id))
        .reply(&filter)
        .await;
    assert_eq!(body(&response)["data"]["data"], json!([0x82, 0, 8]));

    let response = warp::test::request()
        .method("GET")
        .path(&format!("/machine/{}/memory?address=254&length=4", id))
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = warp::test::request()
        .method("DELETE")
        .path(&format!("/machine/{}", id))
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = warp::test::request()
        .method("GET")
        .path(&format!("/machine/{}", id))
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    ls8_emulator::metrics::init_metrics();
    let filter = routes(state());

    warp::test::request()
        .method("POST")
        .path("/run")
        .json(&json!({ "image": MULT, "corrected": true }))
        .reply(&filter)
        .await;

    let response = warp::test::request()
        .method("GET")
        .path("/metrics")
        .reply(&filter)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8_lossy(response.body().as_ref());
    assert!(text.contains("ls8_instructions_total"));
    assert!(text.contains("ls8_api_requests_total"));
}
