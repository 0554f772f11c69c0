mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use tokio::time::Instant;

use common::{KEGG, ScriptedTransport, client, kegg};
use kira_ortholog_mapper::error::OrthoError;

#[tokio::test(start_paused = true)]
async fn retries_transient_status_then_succeeds() {
    let transport = ScriptedTransport::new();
    let url = kegg("/list/eco");
    transport
        .reply(&url, 503, "busy")
        .reply(&url, 429, "slow down")
        .ok(&url, "eco:b0001\tthrL\n");
    let client = client(Arc::clone(&transport), 3);

    let started = Instant::now();
    let body = client.fetch(KEGG, "/list/eco", &[]).await.unwrap();

    assert_eq!(body, "eco:b0001\tthrL\n");
    assert_eq!(transport.count(&url), 3);
    // 0.5 s then 1 s of backoff
    assert!(started.elapsed() >= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn exhausted_attempts_report_last_cause() {
    let transport = ScriptedTransport::new();
    let url = kegg("/list/eco");
    transport.reply(&url, 500, "boom");
    let client = client(Arc::clone(&transport), 3);

    let err = client.fetch(KEGG, "/list/eco", &[]).await.unwrap_err();

    assert_matches!(
        err,
        OrthoError::TransientFetch { attempts: 3, ref cause, .. } if cause.contains("500")
    );
    assert_eq!(transport.count(&url), 3);
}

#[tokio::test(start_paused = true)]
async fn any_server_error_is_retried() {
    for status in [501, 507, 520, 524] {
        let transport = ScriptedTransport::new();
        let url = kegg("/list/eco");
        transport.reply(&url, status, "edge timeout").ok(&url, "ok");
        let client = client(Arc::clone(&transport), 3);

        let body = client.fetch(KEGG, "/list/eco", &[]).await.unwrap();

        assert_eq!(body, "ok");
        assert_eq!(transport.count(&url), 2, "status {status}");
    }
}

#[tokio::test(start_paused = true)]
async fn transport_errors_are_retried() {
    let transport = ScriptedTransport::new();
    let url = kegg("/list/organism");
    transport
        .fail(&url, "connection reset")
        .ok(&url, "T00007\teco\tEscherichia coli K-12 MG1655\n");
    let client = client(Arc::clone(&transport), 3);

    let body = client.fetch(KEGG, "/list/organism", &[]).await.unwrap();

    assert!(body.starts_with("T00007"));
    assert_eq!(transport.count(&url), 2);
}

#[tokio::test(start_paused = true)]
async fn not_found_is_not_retried() {
    let transport = ScriptedTransport::new();
    let client = client(Arc::clone(&transport), 3);

    let err = client.fetch(KEGG, "/link/genes/K99999", &[]).await.unwrap_err();

    assert_matches!(err, OrthoError::NotFound(_));
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn client_errors_fail_immediately() {
    let transport = ScriptedTransport::new();
    let url = kegg("/list/bad");
    transport.reply(&url, 400, "bad request");
    let client = client(Arc::clone(&transport), 3);

    let err = client.fetch(KEGG, "/list/bad", &[]).await.unwrap_err();

    assert_matches!(err, OrthoError::UpstreamStatus { status: 400, .. });
    assert_eq!(transport.count(&url), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_the_rate_limit() {
    let transport = ScriptedTransport::new();
    for index in 0..20 {
        transport.ok(&kegg(&format!("/list/g{index}")), "ok");
    }
    let client = client(Arc::clone(&transport), 3);

    let mut tasks = Vec::new();
    for index in 0..20 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            client
                .fetch(KEGG, &format!("/list/g{index}"), &[])
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut times = transport.call_times();
    times.sort();
    assert_eq!(times.len(), 20);
    for window in times.windows(4) {
        assert!(window[3].duration_since(window[0]) >= Duration::from_secs(1));
    }
}

#[tokio::test(start_paused = true)]
async fn retries_pass_through_the_limiter() {
    let transport = ScriptedTransport::new();
    let url = kegg("/list/eco");
    transport.reply(&url, 503, "busy");
    let client = client(Arc::clone(&transport), 1);

    let _ = client.fetch(KEGG, "/list/eco", &[]).await;

    let times = transport.call_times();
    assert_eq!(times.len(), 3);
    for pair in times.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= Duration::from_secs(1));
    }
}
