use serde_json::Value;

pub fn assert_snapshot_response(snapshot: &Value) {
    assert!(snapshot.get("id").and_then(|v| v.as_str()).is_some());
    assert!(snapshot.get("title").and_then(|v| v.as_str()).is_some());
    assert!(snapshot.get("state").and_then(|v| v.as_str()).is_some());
    assert!(snapshot.get("progress").and_then(|v| v.as_u64()).is_some());
    assert!(snapshot.get("log").and_then(|v| v.as_array()).is_some());
    assert!(snapshot.get("cells").and_then(|v| v.as_array()).is_some());
    assert!(snapshot.get("created_at").is_some());

    let counts = snapshot.get("counts").expect("Missing counts");
    for field in ["total", "pending", "succeeded", "failed"] {
        assert!(counts.get(field).is_some(), "Missing counts.{}", field);
    }
}

/// Cells of a snapshot with the given outcome status
pub fn cells_with_status<'a>(snapshot: &'a Value, status: &str) -> Vec<&'a Value> {
    snapshot["cells"]
        .as_array()
        .expect("Missing cells")
        .iter()
        .filter(|cell| cell["outcome"]["status"] == status)
        .collect()
}

pub fn assert_succeeded_cell(cell: &Value) {
    let outcome = &cell["outcome"];
    assert!(outcome["adapted_script"].as_str().is_some_and(|s| !s.is_empty()));

    let audio = &outcome["audio"];
    assert!(audio["location"].as_str().is_some_and(|s| s.ends_with(".mp3")));
    assert!(audio["size_bytes"].as_u64().is_some_and(|n| n > 0));
    let segments = audio["segments"].as_array().expect("Missing segments");
    assert!(!segments.is_empty());
    for (index, segment) in segments.iter().enumerate() {
        assert_eq!(segment["index"].as_u64(), Some(index as u64));
    }
}
