use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use scanblocker::metrics;

async fn start_test_server(recorder: &PrometheusRecorder) -> std::net::SocketAddr {
    ::metrics::with_local_recorder(recorder, metrics::describe);
    let listener = metrics::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(metrics::serve(listener, recorder.handle()));
    addr
}

fn record(recorder: &PrometheusRecorder, attempts: usize) {
    ::metrics::with_local_recorder(recorder, || {
        for _ in 0..attempts {
            metrics::record_attempt();
        }
    });
}

async fn get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut client = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    client.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    client.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_metrics_reports_counter() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let addr = start_test_server(&recorder).await;

    record(&recorder, 3);

    let response = get(addr, "/metrics").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("# HELP total_conns_attempts Number of attempted connections"));
    assert!(response.contains("# TYPE total_conns_attempts counter"));
    assert!(response.contains("total_conns_attempts 3\n"));
}

#[tokio::test]
async fn test_metrics_follows_later_increments() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let addr = start_test_server(&recorder).await;

    assert!(get(addr, "/metrics").await.contains("total_conns_attempts 0\n"));
    record(&recorder, 1);
    assert!(get(addr, "/metrics").await.contains("total_conns_attempts 1\n"));
}

#[tokio::test]
async fn test_health() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let addr = start_test_server(&recorder).await;
    let response = get(addr, "/health").await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("ok"));
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let addr = start_test_server(&recorder).await;
    assert!(get(addr, "/nope").await.starts_with("HTTP/1.1 404"));
}
