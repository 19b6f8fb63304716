use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDateTime;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use monitor_core::{StreamEvent, TaskConfig, TIME_FORMAT};
use monitor_engine::{
    Backend, BackendError, ClientSettings, EngineEvent, EventSink, HttpBackend,
};

struct TestSink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl TestSink {
    fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn frames(&self) -> Vec<StreamEvent> {
        self.events
            .lock()
            .unwrap()
            .drain(..)
            .filter_map(|event| match event {
                EngineEvent::Frame(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for TestSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn t(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, TIME_FORMAT).unwrap()
}

fn sample_config() -> TaskConfig {
    TaskConfig::for_range(t("2024-05-01T00:00"), t("2024-05-08T00:00"))
}

fn frame_body(payloads: &[&str]) -> String {
    payloads
        .iter()
        .map(|payload| format!("data: {payload}\n\n"))
        .collect()
}

fn backend(server: &MockServer) -> HttpBackend {
    HttpBackend::new(&server.uri(), ClientSettings::default()).unwrap()
}

#[tokio::test]
async fn run_task_posts_the_config_and_emits_decoded_frames() {
    let server = MockServer::start().await;
    let body = frame_body(&[
        r#"{"type":"start","message":"task accepted"}"#,
        r#"{"type":"progress","current":5,"total":100,"percentage":5}"#,
        r#"{"type":"complete","total_processed":100,"session_id":"abc123"}"#,
    ]);
    Mock::given(method("POST"))
        .and(path("/api/batch_parse"))
        .and(header("Content-Type", "application/json"))
        .and(header("Cache-Control", "no-cache"))
        .and(body_json(serde_json::json!({
            "data_source": "opinion_database",
            "start_time": "2024-05-01T00:00",
            "end_time": "2024-05-08T00:00",
            "enable_sentiment": true,
            "enable_tags": true,
            "enable_companies": true,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let sink = TestSink::new();
    let cancel = CancellationToken::new();
    let stats = backend(&server)
        .run_task(&sample_config(), &sink, &cancel)
        .await
        .expect("stream ok");

    assert_eq!(stats.frames, 3);
    assert_eq!(stats.skipped, 0);
    assert!(stats.saw_terminal);
    assert!(!stats.cancelled);

    let frames = sink.frames();
    assert_eq!(
        frames,
        vec![
            StreamEvent::Start {
                message: "task accepted".into(),
            },
            StreamEvent::Progress {
                current: 5,
                total: 100,
                percentage: 5.0,
            },
            StreamEvent::Complete {
                total_processed: 100,
                success_count: None,
                failed_count: None,
                session_id: Some("abc123".into()),
                message: None,
            },
        ]
    );
}

#[tokio::test]
async fn malformed_line_between_valid_frames_is_skipped() {
    let server = MockServer::start().await;
    let body = frame_body(&[
        r#"{"type":"start","message":"go"}"#,
        r#"{"type":"progress",oops"#,
        r#"{"type":"complete","total_processed":2,"session_id":"s1"}"#,
    ]);
    Mock::given(method("POST"))
        .and(path("/api/batch_parse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let sink = TestSink::new();
    let cancel = CancellationToken::new();
    let stats = backend(&server)
        .run_task(&sample_config(), &sink, &cancel)
        .await
        .expect("stream ok");

    assert_eq!(stats.frames, 2);
    assert_eq!(stats.skipped, 1);
    assert!(stats.saw_terminal);
    assert!(matches!(
        sink.frames().last(),
        Some(StreamEvent::Complete { .. })
    ));
}

#[tokio::test]
async fn http_error_status_fails_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/batch_parse"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let sink = TestSink::new();
    let cancel = CancellationToken::new();
    let err = backend(&server)
        .run_task(&sample_config(), &sink, &cancel)
        .await
        .unwrap_err();

    assert_eq!(err, BackendError::HttpStatus { status: 500 });
    assert!(sink.frames().is_empty());
}

#[tokio::test]
async fn stream_ending_without_complete_reports_no_terminal() {
    let server = MockServer::start().await;
    let body = frame_body(&[
        r#"{"type":"start","message":"go"}"#,
        r#"{"type":"progress","current":42,"total":100,"percentage":42}"#,
    ]);
    Mock::given(method("POST"))
        .and(path("/api/batch_parse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let sink = TestSink::new();
    let cancel = CancellationToken::new();
    let stats = backend(&server)
        .run_task(&sample_config(), &sink, &cancel)
        .await
        .expect("transport itself succeeded");

    assert_eq!(stats.frames, 2);
    assert!(!stats.saw_terminal);
}

#[tokio::test]
async fn in_band_error_frame_is_terminal() {
    let server = MockServer::start().await;
    let body = frame_body(&[
        r#"{"type":"start","message":"go"}"#,
        r#"{"type":"error","message":"database connection lost"}"#,
    ]);
    Mock::given(method("POST"))
        .and(path("/api/batch_parse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let sink = TestSink::new();
    let cancel = CancellationToken::new();
    let stats = backend(&server)
        .run_task(&sample_config(), &sink, &cancel)
        .await
        .expect("stream ok");

    assert!(stats.saw_terminal);
    let frames = sink.frames();
    assert_eq!(
        frames.last(),
        Some(&StreamEvent::Error {
            message: "database connection lost".into(),
        })
    );
}

#[tokio::test]
async fn nothing_after_the_terminal_frame_is_dispatched() {
    let server = MockServer::start().await;
    let body = frame_body(&[
        r#"{"type":"complete","total_processed":1,"session_id":"early"}"#,
        r#"{"type":"progress","current":9,"total":9,"percentage":100}"#,
    ]);
    Mock::given(method("POST"))
        .and(path("/api/batch_parse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let sink = TestSink::new();
    let cancel = CancellationToken::new();
    let stats = backend(&server)
        .run_task(&sample_config(), &sink, &cancel)
        .await
        .expect("stream ok");

    assert_eq!(stats.frames, 1);
    assert_eq!(sink.frames().len(), 1);
}

#[tokio::test]
async fn zero_data_complete_decodes_without_a_session() {
    let server = MockServer::start().await;
    let body = frame_body(&[r#"{"type":"complete","total_processed":0,"message":"no rows in range"}"#]);
    Mock::given(method("POST"))
        .and(path("/api/batch_parse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let sink = TestSink::new();
    let cancel = CancellationToken::new();
    backend(&server)
        .run_task(&sample_config(), &sink, &cancel)
        .await
        .expect("stream ok");

    assert_eq!(
        sink.frames(),
        vec![StreamEvent::Complete {
            total_processed: 0,
            success_count: None,
            failed_count: None,
            session_id: None,
            message: Some("no rows in range".into()),
        }]
    );
}

#[tokio::test]
async fn cancellation_tears_the_stream_down() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/batch_parse"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_raw("data: {\"type\":\"start\",\"message\":\"late\"}\n\n", "text/event-stream"),
        )
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trip = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trip.cancel();
    });

    let sink = TestSink::new();
    let stats = backend(&server)
        .run_task(&sample_config(), &sink, &cancel)
        .await
        .expect("cancellation is not an error");

    assert!(stats.cancelled);
    assert_eq!(stats.frames, 0);
    assert!(!stats.saw_terminal);
}

#[tokio::test]
async fn idle_timeout_fails_a_hung_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/batch_parse"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(500))
                .set_body_raw("data: {\"type\":\"start\",\"message\":\"late\"}\n\n", "text/event-stream"),
        )
        .mount(&server)
        .await;

    let settings = ClientSettings {
        idle_timeout: Duration::from_millis(50),
        ..ClientSettings::default()
    };
    let backend = HttpBackend::new(&server.uri(), settings).unwrap();

    let sink = TestSink::new();
    let cancel = CancellationToken::new();
    let err = backend
        .run_task(&sample_config(), &sink, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::IdleTimeout { .. }));
}

#[test]
fn rejects_an_unparsable_base_url() {
    let err = HttpBackend::new("not a url", ClientSettings::default()).unwrap_err();
    assert!(matches!(err, BackendError::InvalidUrl(_)));
}
