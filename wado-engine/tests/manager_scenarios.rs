//! End-to-end scenarios driving [`DownloadManager`] against a mock WADO
//! endpoint: small WADO-URI series, WADO-RS multipart, the transfer-syntax
//! fallback retry, bearer token refresh, mid-stream cancellation, and
//! cross-series SOP deduplication.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wado_engine::adapter::reference::InMemoryObjectModel;
use wado_engine::auth::{AuthMethod, RefreshingAuthMethod, TokenRefresher};
use wado_engine::config::WadoEngineConfig;
use wado_engine::events::{DownloadEvent, EventBus};
use wado_engine::manager::DownloadManager;
use wado_engine::model::{OpeningStrategy, SeriesRef, SopInstanceRef, TaskStatus, WadoEndpoint};
use wado_engine::task::new_task;
use wado_engine::transport::Transport;

mod support;

fn make_config(dir: &TempDir) -> Arc<WadoEngineConfig> {
    let mut config = WadoEngineConfig::default();
    config.tmp_root = dir.path().join("tmp");
    config.export_dir = dir.path().join("export");
    Arc::new(config)
}

fn make_transport(config: &WadoEngineConfig, auth: Option<Arc<dyn AuthMethod>>) -> Arc<Transport> {
    Arc::new(
        Transport::new(
            config.connect_timeout(),
            config.read_timeout(),
            config.max_redirects,
            auth,
        )
        .expect("transport builds with no TLS/proxy config involved"),
    )
}

fn make_adapter() -> (Arc<InMemoryObjectModel>, tokio::sync::broadcast::Receiver<DownloadEvent>) {
    let bus = EventBus::default();
    let rx = bus.subscribe();
    (Arc::new(InMemoryObjectModel::new(bus)), rx)
}

fn collect_adds(events: &mut tokio::sync::broadcast::Receiver<DownloadEvent>) -> Vec<String> {
    let mut added = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DownloadEvent::Add { instance, .. } = event {
            added.push(instance.sop_instance_uid);
        }
    }
    added
}

#[tokio::test]
async fn wado_uri_small_series_downloads_every_instance() {
    let dir = tempfile::tempdir().unwrap();
    let config = make_config(&dir);
    let transport = make_transport(&config, None);
    let (adapter, mut events) = make_adapter();

    let mock_server = MockServer::start().await;
    let patient = "PAT-1";
    let study = "STU-1";
    for sop in ["U1", "U2", "U3"] {
        let bytes = support::dicom_instance_bytes(sop, patient, study);
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("objectUID", sop))
            .respond_with(ResponseTemplate::new(200).set_body_raw(bytes, "application/dicom"))
            .mount(&mock_server)
            .await;
    }

    let endpoint = WadoEndpoint::new(mock_server.uri());
    let mut series = SeriesRef::new("1.1", study, patient, endpoint);
    for sop in ["U1", "U2", "U3"] {
        series.instances.push(SopInstanceRef::new(sop));
    }

    let (mut task, handle) = new_task(series, OpeningStrategy::Eager);
    let manager = DownloadManager::new(transport, adapter, config.clone());
    manager.run(&task, &handle).await;

    assert_eq!(task.wait_terminal().await, TaskStatus::Complete);
    let progress = task.progress();
    assert_eq!(progress.current, 3);
    assert_eq!(progress.max, 3);

    let mut added = collect_adds(&mut events);
    added.sort();
    assert_eq!(added, vec!["U1".to_string(), "U2".to_string(), "U3".to_string()]);

    let mut files: Vec<_> = std::fs::read_dir(&config.export_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    files.sort();
    assert_eq!(files, vec!["U1.dcm", "U2.dcm", "U3.dcm"]);
}

#[tokio::test]
async fn wado_rs_multipart_response_yields_each_instance() {
    let dir = tempfile::tempdir().unwrap();
    let config = make_config(&dir);
    let transport = make_transport(&config, None);
    let (adapter, mut events) = make_adapter();

    let mock_server = MockServer::start().await;
    let patient = "PAT-2";
    let study = "STU-2";
    let series_uid = "2.1";

    for sop in ["U1", "U2"] {
        let part = support::dicom_instance_bytes(sop, patient, study);
        let body = support::multipart_body("abc123", &[part]);
        Mock::given(method("GET"))
            .and(path(format!("/series/{series_uid}/instances/{sop}")))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                body,
                "multipart/related; boundary=abc123; type=\"application/dicom\"",
            ))
            .mount(&mock_server)
            .await;
    }

    let endpoint = WadoEndpoint::new(mock_server.uri()).wado_rs(true);
    let mut series = SeriesRef::new(series_uid, study, patient, endpoint);
    series.instances.push(SopInstanceRef::new("U1"));
    series.instances.push(SopInstanceRef::new("U2"));

    let (mut task, handle) = new_task(series, OpeningStrategy::Eager);
    let manager = DownloadManager::new(transport, adapter, config.clone());
    manager.run(&task, &handle).await;

    assert_eq!(task.wait_terminal().await, TaskStatus::Complete);

    let mut added = collect_adds(&mut events);
    added.sort();
    assert_eq!(added, vec!["U1".to_string(), "U2".to_string()]);

    let mut files: Vec<_> = std::fs::read_dir(&config.export_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    files.sort();
    assert_eq!(files, vec!["U1.dcm", "U2.dcm"]);
}

#[tokio::test]
async fn falls_back_to_default_transfer_syntax_on_unsupported_tsuid() {
    let dir = tempfile::tempdir().unwrap();
    let config = make_config(&dir);
    let transport = make_transport(&config, None);
    let (adapter, mut events) = make_adapter();

    let mock_server = MockServer::start().await;
    let patient = "PAT-3";
    let study = "STU-3";
    let good = support::dicom_instance_bytes("U1", patient, study);
    let bad = support::with_unsupported_transfer_syntax(good.clone());

    // The registry in this workspace has no codec for the transfer syntax
    // `bad` claims, so the first response forces the retry. wiremock tries
    // lower-numbered priorities first, and `up_to_n_times(1)` retires this
    // mock after the one request it's meant to serve, so the second,
    // lower-priority mock catches the retry regardless of its query string.
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("objectUID", "U1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(bad, "application/dicom"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("objectUID", "U1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(good, "application/dicom"))
        .with_priority(2)
        .mount(&mock_server)
        .await;

    let endpoint = WadoEndpoint::new(mock_server.uri());
    let mut series = SeriesRef::new("3.1", study, patient, endpoint);
    series.instances.push(SopInstanceRef::new("U1"));

    let (mut task, handle) = new_task(series, OpeningStrategy::Eager);
    let manager = DownloadManager::new(transport, adapter, config.clone());
    manager.run(&task, &handle).await;

    assert_eq!(task.wait_terminal().await, TaskStatus::Complete);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
    assert_eq!(collect_adds(&mut events).len(), 1);
}

struct OnceRefresher {
    calls: AtomicUsize,
}

#[async_trait]
impl TokenRefresher for OnceRefresher {
    async fn refresh(&self) -> Option<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Some(format!("token-{n}"))
    }
}

#[tokio::test]
async fn refreshes_bearer_token_once_after_401() {
    let dir = tempfile::tempdir().unwrap();
    let config = make_config(&dir);
    let auth: Arc<dyn AuthMethod> = Arc::new(RefreshingAuthMethod::new(OnceRefresher {
        calls: AtomicUsize::new(0),
    }));
    let transport = make_transport(&config, Some(auth));
    let (adapter, mut events) = make_adapter();

    let mock_server = MockServer::start().await;
    let patient = "PAT-4";
    let study = "STU-4";
    let bytes = support::dicom_instance_bytes("U1", patient, study);

    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("objectUID", "U1"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("objectUID", "U1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(bytes, "application/dicom"))
        .with_priority(2)
        .mount(&mock_server)
        .await;

    let endpoint = WadoEndpoint::new(mock_server.uri());
    let mut series = SeriesRef::new("4.1", study, patient, endpoint);
    series.instances.push(SopInstanceRef::new("U1"));

    let (mut task, handle) = new_task(series, OpeningStrategy::Eager);
    let manager = DownloadManager::new(transport, adapter, config.clone());
    manager.run(&task, &handle).await;

    assert_eq!(task.wait_terminal().await, TaskStatus::Complete);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
    assert_eq!(collect_adds(&mut events).len(), 1);
}

#[tokio::test]
async fn cancelling_mid_stream_stops_further_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let config = make_config(&dir);
    let transport = make_transport(&config, None);
    let (adapter, mut events) = make_adapter();

    let mock_server = MockServer::start().await;
    let patient = "PAT-5";
    let study = "STU-5";
    let bytes = support::dicom_instance_bytes("shared", patient, study);

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(bytes, "application/dicom")
                .set_delay(Duration::from_millis(120)),
        )
        .mount(&mock_server)
        .await;

    let endpoint = WadoEndpoint::new(mock_server.uri());
    let mut series = SeriesRef::new("5.1", study, patient, endpoint);
    for i in 0..10 {
        series.instances.push(SopInstanceRef::new(format!("U{i}")));
    }

    let (task, handle) = new_task(series, OpeningStrategy::Eager);
    let cancel_handle = task.clone();
    let manager = DownloadManager::new(transport, adapter, config.clone());

    let run = tokio::spawn(async move {
        let mut task = task;
        manager.run(&task, &handle).await;
        task.wait_terminal().await
    });

    let mut added = 0;
    loop {
        match events.recv().await {
            Ok(DownloadEvent::Add { .. }) => {
                added += 1;
                if added == 3 {
                    cancel_handle.cancel();
                    break;
                }
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }

    let status = run.await.unwrap();
    assert_eq!(status, TaskStatus::Cancelled);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let remaining_tmp = std::fs::read_dir(config.downloading_dir())
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(remaining_tmp, 0, "no partial downloads should remain after cancellation settles");

    let exported = std::fs::read_dir(&config.export_dir).unwrap().count();
    assert!(
        exported <= config.series_concurrency,
        "at most one in-flight batch should have completed, got {exported}"
    );
}

#[tokio::test]
async fn duplicate_sop_across_split_series_downloads_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = make_config(&dir);
    let transport = make_transport(&config, None);

    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let adapter = Arc::new(InMemoryObjectModel::new(bus));

    let mock_server = MockServer::start().await;
    let patient = "PAT-6";
    let study = "STU-6";
    for sop in ["S1-only", "U7"] {
        let bytes = support::dicom_instance_bytes(sop, patient, study);
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("objectUID", sop))
            .respond_with(ResponseTemplate::new(200).set_body_raw(bytes, "application/dicom"))
            .mount(&mock_server)
            .await;
    }

    let endpoint = WadoEndpoint::new(mock_server.uri());

    let mut s1 = SeriesRef::new("6.1", study, patient, endpoint.clone());
    s1.instances.push(SopInstanceRef::new("S1-only"));
    s1.instances.push(SopInstanceRef::new("U7"));

    let (mut task1, handle1) = new_task(s1, OpeningStrategy::Eager);
    let manager = DownloadManager::new(transport.clone(), adapter.clone(), config.clone());
    manager.run(&task1, &handle1).await;
    assert_eq!(task1.wait_terminal().await, TaskStatus::Complete);

    // The host records what it learned from S1's `Add` events before S2 is
    // opened, the way a real object model would as it ingests them.
    for sop in collect_adds(&mut events) {
        adapter.seed_known_sop_uid(&sop);
    }

    let mut s2 = SeriesRef::new("6.2", study, patient, endpoint);
    s2.instances.push(SopInstanceRef::new("U7"));

    let (mut task2, handle2) = new_task(s2, OpeningStrategy::Eager);
    manager.run(&task2, &handle2).await;
    assert_eq!(task2.wait_terminal().await, TaskStatus::Complete);

    assert!(
        collect_adds(&mut events).is_empty(),
        "U7 should be skipped as a duplicate in the second series"
    );

    let requests = mock_server.received_requests().await.unwrap();
    let u7_requests = requests
        .iter()
        .filter(|r| r.url.query().unwrap_or_default().contains("objectUID=U7"))
        .count();
    assert_eq!(u7_requests, 1, "U7 must only be fetched once across both series");
}
