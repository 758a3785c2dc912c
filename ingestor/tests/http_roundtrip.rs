use serde_json::{json, Value};
use std::sync::Arc;
use storage_ingestor::{export, rest, schema, Gateway};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

async fn spawn_server() -> (String, Arc<Mutex<Gateway>>) {
    let gateway = schema::connect_ready("sqlite::memory:").await.unwrap();
    let shared = Arc::new(Mutex::new(gateway));
    let app = rest::create_router(shared.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/receive_data", addr), shared)
}

#[tokio::test]
async fn test_reading_is_posted_stored_and_exported() {
    let (url, gateway) = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&url)
        .json(&json!({"device_number": 7, "free_space": 5368709120_i64}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["free_space_gb"], 5.0);
    let recorded_at = body["data"]["recorded_at"].as_str().unwrap().to_string();

    let mut gateway = gateway.lock().await;
    let latest = export::latest_readings(&mut gateway).await.unwrap();
    let text = export::render(&latest, 1..=40, "now");
    assert!(text.contains(&format!("07,5.0,{}", recorded_at)), "{text}");
}

#[tokio::test]
async fn test_rejections_leave_database_untouched() {
    let (url, gateway) = spawn_server().await;
    let client = reqwest::Client::new();

    let get = client.get(&url).send().await.unwrap();
    assert_eq!(get.status(), reqwest::StatusCode::BAD_REQUEST);

    let garbage = client.post(&url).body("{not json").send().await.unwrap();
    assert_eq!(garbage.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = garbage.json().await.unwrap();
    assert_eq!(body["message"], "Invalid JSON data");

    let missing = client
        .post(&url)
        .json(&json!({"free_space": 10}))
        .send()
        .await
        .unwrap();
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["message"], "Validation failed: Missing required field: device_number");

    let mut gateway = gateway.lock().await;
    let devices = gateway.fetch_all("SELECT * FROM devices", &[]).await.unwrap();
    let readings = gateway.fetch_all("SELECT * FROM storage_data", &[]).await.unwrap();
    assert!(devices.is_empty());
    assert!(readings.is_empty());
}

#[tokio::test]
async fn test_concurrent_posts_for_one_device() {
    let (url, gateway) = spawn_server().await;
    let client = reqwest::Client::new();

    let mut handles = Vec::new();
    for free_space in 1..=20_i64 {
        let client = client.clone();
        let url = url.clone();
        handles.push(tokio::spawn(async move {
            client
                .post(&url)
                .json(&json!({"device_number": 3, "free_space": free_space * 1024}))
                .send()
                .await
                .unwrap()
                .status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), reqwest::StatusCode::OK);
    }

    let mut gateway = gateway.lock().await;
    let devices = gateway.fetch_all("SELECT * FROM devices", &[]).await.unwrap();
    let readings = gateway.fetch_all("SELECT * FROM storage_data", &[]).await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(readings.len(), 20);
}
