use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Deserialize)]
struct SmokeEvent {
    id: String,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct SmokeView {
    events: Vec<SmokeEvent>,
    today_count: usize,
    last_timestamp: Option<i64>,
    persistence_degraded: bool,
}

#[derive(Debug, Deserialize)]
struct BoxOpen {
    id: String,
    brand: String,
    boxes: u32,
}

#[derive(Debug, Deserialize)]
struct BoxEntry {
    id: String,
    brand: String,
    boxes: u32,
    previous_lasted: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BoxView {
    selected_brand: Option<String>,
    brands: Vec<String>,
    entries: Vec<BoxEntry>,
    boxes_last_30_days: u64,
}

struct TestServer {
    base_url: String,
    data_path: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));
static SERVER: Lazy<Mutex<Option<Arc<TestServer>>>> = Lazy::new(|| Mutex::new(None));

#[cfg(unix)]
mod cleanup {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Once;

    static REGISTER: Once = Once::new();
    static PID: AtomicI32 = AtomicI32::new(0);

    pub fn register(pid: u32) {
        REGISTER.call_once(|| {
            PID.store(pid as i32, Ordering::SeqCst);
            unsafe {
                libc::atexit(on_exit);
            }
        });
    }

    extern "C" fn on_exit() {
        let pid = PID.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn unique_data_path() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("smoke_tracker_http_{}_{}.json", std::process::id(), nanos));
    path.to_string_lossy().to_string()
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/smokes")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server(data_path: String) -> TestServer {
    let port = pick_free_port();
    let child = Command::new(env!("CARGO_BIN_EXE_smoke_tracker"))
        .env("PORT", port.to_string())
        .env("APP_DATA_PATH", &data_path)
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer {
        base_url,
        data_path,
        child,
    }
}

async fn shared_server() -> Arc<TestServer> {
    let mut guard = SERVER.lock().await;
    if let Some(server) = guard.as_ref() {
        return Arc::clone(server);
    }
    let server = Arc::new(spawn_server(unique_data_path()).await);
    *guard = Some(Arc::clone(&server));
    server
}

async fn smokes(client: &Client, base_url: &str) -> SmokeView {
    client
        .get(format!("{base_url}/api/smokes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn boxes(client: &Client, base_url: &str, brand: Option<&str>) -> BoxView {
    let mut request = client.get(format!("{base_url}/api/boxes"));
    if let Some(brand) = brand {
        request = request.query(&[("brand", brand)]);
    }
    request.send().await.unwrap().json().await.unwrap()
}

fn read_stored(data_path: &str, key: &str) -> Option<serde_json::Value> {
    let bytes = std::fs::read(data_path).ok()?;
    let file = serde_json::from_slice::<serde_json::Value>(&bytes).ok()?;
    let raw = file.get(key)?.as_str()?;
    serde_json::from_str(raw).ok()
}

/// Polls the data file until the stored log under `key` satisfies `ready`;
/// returns the last value seen once the deadline passes.
async fn stored_value(
    data_path: &str,
    key: &str,
    ready: impl Fn(&serde_json::Value) -> bool,
) -> Option<serde_json::Value> {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let stored = read_stored(data_path, key);
        if stored.as_ref().is_some_and(&ready) || Instant::now() > deadline {
            return stored;
        }
        sleep(Duration::from_millis(50)).await;
    }
}

fn contains_id(stored: &serde_json::Value, id: &str) -> bool {
    stored
        .as_array()
        .is_some_and(|entries| entries.iter().any(|entry| entry["id"] == id))
}

#[tokio::test]
async fn http_log_smoke_prepends_and_counts_today() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let before = smokes(&client, &server.base_url).await;

    let response = client
        .post(format!("{}/api/smokes", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: SmokeEvent = response.json().await.unwrap();

    let after = smokes(&client, &server.base_url).await;
    assert_eq!(after.events.len(), before.events.len() + 1);
    assert_eq!(after.events[0].id, created.id);
    assert_eq!(after.last_timestamp, Some(created.timestamp));
    assert_eq!(after.today_count, before.today_count + 1);
    assert!(!after.persistence_degraded);
}

#[tokio::test]
async fn http_delete_smoke_is_idempotent() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let created: SmokeEvent = client
        .post(format!("{}/api/smokes", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let before = smokes(&client, &server.base_url).await;

    for _ in 0..2 {
        let response = client
            .delete(format!("{}/api/smokes/{}", server.base_url, created.id))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let after = smokes(&client, &server.base_url).await;
    assert_eq!(after.events.len(), before.events.len() - 1);
    assert!(after.events.iter().all(|event| event.id != created.id));
}

#[tokio::test]
async fn http_box_log_filters_and_rejects_blank_brand() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let blank = client
        .post(format!("{}/api/boxes", server.base_url))
        .json(&serde_json::json!({ "brand": "   ", "boxes": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);

    let first: BoxOpen = client
        .post(format!("{}/api/boxes", server.base_url))
        .json(&serde_json::json!({ "brand": "  Test   Brand ", "boxes": 2.6 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first.brand, "Test Brand");
    assert_eq!(first.boxes, 2);

    let second: BoxOpen = client
        .post(format!("{}/api/boxes", server.base_url))
        .json(&serde_json::json!({ "brand": "Test Brand" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second.boxes, 1);

    let view = boxes(&client, &server.base_url, Some("Test Brand")).await;
    assert_eq!(view.selected_brand.as_deref(), Some("Test Brand"));
    assert!(view.entries.len() >= 2);
    assert_eq!(view.entries[0].id, second.id);
    assert!(view.entries[0].previous_lasted.is_some());
    assert!(view.entries.iter().all(|entry| entry.brand == "Test Brand"));
    assert!(view.boxes_last_30_days >= 3);

    let default_view = boxes(&client, &server.base_url, None).await;
    assert_eq!(default_view.brands[0], "Test Brand");
    assert_eq!(default_view.selected_brand.as_deref(), Some("Test Brand"));

    let stored = stored_value(&server.data_path, "smoke_break_tracker_box_opens", |stored| {
        contains_id(stored, &second.id)
    })
    .await
    .expect("box log persisted");
    assert!(contains_id(&stored, &second.id));
    assert!(contains_id(&stored, &first.id));
}

#[tokio::test]
async fn http_box_api_is_lenient_about_fields() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let missing_brand = client
        .post(format!("{}/api/boxes", server.base_url))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_brand.status(), StatusCode::BAD_REQUEST);

    let text_quantity: BoxOpen = client
        .post(format!("{}/api/boxes", server.base_url))
        .json(&serde_json::json!({ "brand": "Lenient", "boxes": "3" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(text_quantity.boxes, 3);

    let junk_quantity = client
        .post(format!("{}/api/boxes", server.base_url))
        .json(&serde_json::json!({ "brand": "Lenient", "boxes": "many" }))
        .send()
        .await
        .unwrap();
    assert_eq!(junk_quantity.status(), StatusCode::CREATED);
    let junk_quantity: BoxOpen = junk_quantity.json().await.unwrap();
    assert_eq!(junk_quantity.boxes, 1);
}

#[tokio::test]
async fn http_forms_redirect_back_to_pages() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let page = client
        .post(format!("{}/boxes", server.base_url))
        .form(&[("brand", "Form Brand"), ("boxes", "")])
        .send()
        .await
        .unwrap();
    assert!(page.status().is_success());
    let html = page.text().await.unwrap();
    assert!(html.contains("Form Brand"));
    assert!(html.contains("x1"));

    let home = client
        .post(format!("{}/smokes", server.base_url))
        .send()
        .await
        .unwrap();
    assert!(home.status().is_success());
    assert!(home.text().await.unwrap().contains("Log Cigarette"));

    let view = boxes(&client, &server.base_url, Some("")).await;
    let entry = view
        .entries
        .iter()
        .find(|entry| entry.brand == "Form Brand")
        .expect("form entry logged");
    let removed = client
        .post(format!("{}/boxes/{}/delete", server.base_url, entry.id))
        .send()
        .await
        .unwrap();
    assert!(removed.status().is_success());
    let view = boxes(&client, &server.base_url, Some("Form Brand")).await;
    assert!(view.entries.is_empty());
}

#[tokio::test]
async fn http_loads_legacy_and_drops_invalid_records() {
    let data_path = unique_data_path();
    let future = wall_clock_ms() + 86_400_000;
    let smokes_raw = format!(
        r#"[1000, {{"id":"odd/id?x","timestamp":500}}, {{"id":"kept","timestamp":2000}}, {future}, -5, 0.5, "junk"]"#
    );
    let boxes_raw = r#"[{"id":"a","timestamp":1000,"brand":"  "}, {"id":"b","timestamp":3000,"brand":"Camel","boxes":-2}]"#;
    let file = serde_json::json!({
        "smoke_break_tracker_logs": smokes_raw,
        "smoke_break_tracker_box_opens": boxes_raw,
    });
    std::fs::write(&data_path, serde_json::to_vec(&file).unwrap()).unwrap();

    let server = spawn_server(data_path).await;
    let client = Client::new();

    let view = smokes(&client, &server.base_url).await;
    let timestamps: Vec<i64> = view.events.iter().map(|event| event.timestamp).collect();
    assert_eq!(timestamps, vec![2000, 1000, 500]);
    assert_eq!(view.events[0].id, "kept");
    assert_eq!(view.last_timestamp, Some(2000));

    let log_page = client
        .get(format!("{}/log", server.base_url))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(log_page.contains(r#"action="/smokes/odd%2Fid%3Fx/delete""#));
    let removed = client
        .post(format!("{}/smokes/odd%2Fid%3Fx/delete", server.base_url))
        .send()
        .await
        .unwrap();
    assert!(removed.status().is_success());
    let view = smokes(&client, &server.base_url).await;
    assert!(view.events.iter().all(|event| event.id != "odd/id?x"));
    assert_eq!(view.events.len(), 2);

    let box_view = boxes(&client, &server.base_url, Some("")).await;
    assert_eq!(box_view.entries.len(), 1);
    assert_eq!(box_view.entries[0].brand, "Camel");
    assert_eq!(box_view.entries[0].boxes, 1);
}

#[tokio::test]
async fn http_corrupt_store_starts_empty() {
    let data_path = unique_data_path();
    let file = serde_json::json!({ "smoke_break_tracker_logs": "[{oops" });
    std::fs::write(&data_path, serde_json::to_vec(&file).unwrap()).unwrap();

    let server = spawn_server(data_path).await;
    let client = Client::new();

    let view = smokes(&client, &server.base_url).await;
    assert!(view.events.is_empty());
    assert_eq!(view.today_count, 0);
}

fn wall_clock_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}
