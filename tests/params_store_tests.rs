use retinosync::error::ErrorKind;
use retinosync::params::{
    AnalysisParams, InMemoryParameterStore, ParameterChange, ParameterStore, SessionParameters,
    StimulusParams, TimestampMode,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn example_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/params.example.json")
}

#[tokio::test]
async fn test_example_config_parses() {
    let store = InMemoryParameterStore::new();
    store.load_json(&example_config()).await.unwrap();

    let session = SessionParameters::from_store(&store).unwrap();
    assert_eq!(session.acquisition.directions.len(), 4);
    assert_eq!(session.camera.timestamp_mode, TimestampMode::Strict);
    assert!(session.monitor.horizontal_span_deg() > 0.0);

    let stimulus = StimulusParams::from_store(&store).unwrap();
    assert_eq!(stimulus.frames_per_sweep(&session.monitor), 720);
    assert_eq!(stimulus.render_size(&session.monitor), (240, 135));

    let analysis = AnalysisParams::from_store(&store).unwrap();
    assert_eq!(analysis.pipeline_config().sobel_kernel_size, 3);
}

#[tokio::test]
async fn test_save_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("params.json");

    let store = InMemoryParameterStore::new();
    store.load_json(&example_config()).await.unwrap();
    store.set("acquisition", "cycles", json!(3));
    store.save_json(&path).await.unwrap();

    let reloaded = InMemoryParameterStore::new();
    reloaded.load_json(&path).await.unwrap();
    assert_eq!(reloaded.get("acquisition", "cycles"), Some(json!(3)));
    assert_eq!(reloaded.snapshot(), store.snapshot());
}

#[tokio::test]
async fn test_unreadable_documents_are_rejected() {
    let dir = TempDir::new().unwrap();
    let store = InMemoryParameterStore::new();

    assert!(store.load_json(&dir.path().join("absent.json")).await.is_err());

    let malformed = dir.path().join("malformed.json");
    tokio::fs::write(&malformed, "{ not json").await.unwrap();
    assert!(store.load_json(&malformed).await.is_err());

    let flat = dir.path().join("flat.json");
    tokio::fs::write(&flat, r#"{"cycles": 3}"#).await.unwrap();
    assert!(store.load_json(&flat).await.is_err());
}

#[tokio::test]
async fn test_missing_and_invalid_values() {
    let store = InMemoryParameterStore::new();
    store.load_json(&example_config()).await.unwrap();

    store.remove("monitor", "distance_cm");
    let err = SessionParameters::from_store(&store).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ParameterMissing);

    store.set("monitor", "distance_cm", json!(10.0));
    store.set("camera", "timestamp_mode", json!("sometimes"));
    let err = SessionParameters::from_store(&store).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ParameterInvalid);

    store.set("camera", "timestamp_mode", json!("relaxed"));
    store.set("acquisition", "directions", json!(["LR", "LR"]));
    let err = SessionParameters::from_store(&store).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ParameterInvalid);

    store.set("analysis", "sobel_kernel_size", json!(4));
    let err = AnalysisParams::from_store(&store).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ParameterInvalid);
}

#[test]
fn test_subscribers_see_changes_of_their_group() {
    let store = InMemoryParameterStore::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let id = store.subscribe(
        "camera",
        Box::new(move |change: &ParameterChange| sink.lock().unwrap().push(change.key.clone())),
    );

    store.set("camera", "fps", json!(30.0));
    store.set("monitor", "fps", json!(60.0));
    store.unsubscribe(id);
    store.set("camera", "fps", json!(25.0));

    assert_eq!(*seen.lock().unwrap(), vec!["fps".to_string()]);
}
