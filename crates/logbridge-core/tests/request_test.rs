use chrono::{TimeZone, Utc};
use logbridge_core::LogRequest;

#[test]
fn test_resume_rewinds_100ms() {
    let mut req = LogRequest::new("default", "web-0");
    req.since_seconds = Some(600);
    let cursor = Utc.with_ymd_and_hms(2023, 12, 7, 10, 30, 45).unwrap();

    let resumed = req.resume_from(cursor);

    assert_eq!(resumed.uuid, req.uuid); // same session
    assert_eq!(
        resumed.since_time,
        Some(cursor - chrono::Duration::milliseconds(100))
    );
    // sinceSeconds and sinceTime are mutually exclusive on the log API
    assert!(resumed.since_seconds.is_none());
    // original untouched
    assert!(req.since_time.is_none());
}

#[test]
fn test_event_payload_round_trip() {
    let mut req = LogRequest::new("prod", "api-7f9");
    req.container = "app".to_string();
    req.follow = true;
    req.tail_lines = Some(100);
    req.timestamps = true;

    let payload = serde_json::to_vec(&req).unwrap();
    let decoded: LogRequest = serde_json::from_slice(&payload).unwrap();

    assert_eq!(decoded.uuid, req.uuid);
    assert_eq!(decoded.namespace, "prod");
    assert_eq!(decoded.pod, "api-7f9");
    assert_eq!(decoded.container, "app");
    assert!(decoded.follow);
    assert_eq!(decoded.tail_lines, Some(100));
}

#[test]
fn test_event_payload_uses_camel_case() {
    let mut req = LogRequest::new("ns", "pod");
    req.tail_lines = Some(5);
    let json = serde_json::to_string(&req).unwrap();
    assert!(json.contains("\"tailLines\":5"));
    assert!(json.contains("\"sinceSeconds\""));
}

#[test]
fn test_partial_event_decodes_with_defaults() {
    // at-least-once queue may carry events from an older gateway
    let json = r#"{"uuid":"8f2c9e1a-77aa-4b2e-9d0f-0f6f2a1b3c4d","namespace":"ns","pod":"p"}"#;
    let decoded: LogRequest = serde_json::from_str(json).unwrap();
    assert!(!decoded.follow);
    assert!(decoded.container.is_empty());
    assert!(decoded.tail_lines.is_none());
}
