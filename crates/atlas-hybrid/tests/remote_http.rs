use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use atlas_core::traits::{NearestNeighbors, SearchOptions};
use atlas_core::types::{IdTuple, Point, RowId};
use atlas_hybrid::{RemoteNeighbors, UploadFile, UploadNeighbors, UploadNeighborsClient};

/// Serves one canned HTTP response and hands back the raw request.
async fn serve_once(status: &'static str, body: &'static str) -> anyhow::Result<(String, oneshot::Receiver<String>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else { return };
        let mut head = Vec::new();
        let mut buf = [0u8; 4096];
        // read until the client goes quiet so an upload body is drained too
        loop {
            match tokio::time::timeout(Duration::from_millis(200), socket.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => head.extend_from_slice(&buf[..n]),
                _ => break,
            }
        }
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
        let _ = tx.send(String::from_utf8_lossy(&head).into_owned());
    });
    Ok((format!("http://{addr}"), rx))
}

#[tokio::test]
async fn remote_neighbors_skip_the_queried_row() -> anyhow::Result<()> {
    let body = r#"{"neighbors": [{"id": 42, "distance": 0.0}, {"id": 7, "distance": 0.1}, {"id": 8, "distance": 0.2}]}"#;
    let (base, head) = serve_once("200 OK", body).await?;
    let remote = RemoteNeighbors::new(&format!("{base}/neighbors"))?;

    let out = remote.nearest_neighbors(&RowId::Int(42), &SearchOptions::new(16)).await?;

    assert_eq!(out, vec![IdTuple::new(7, Some(0.1)), IdTuple::new(8, Some(0.2))]);
    let head = head.await?;
    assert!(head.starts_with("GET /neighbors?id=42&k=17 "), "unexpected request: {head}");
    Ok(())
}

#[tokio::test]
async fn server_errors_become_empty_answers() -> anyhow::Result<()> {
    let (base, _head) = serve_once("500 Internal Server Error", r#"{"error": "down"}"#).await?;
    let remote = RemoteNeighbors::new(&base)?;

    let statuses = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = statuses.clone();
    let opts = SearchOptions::new(5).with_status(Arc::new(move |s: Option<String>| sink.lock().push(s)));
    let out = remote.nearest_neighbors(&RowId::Int(1), &opts).await?;

    assert!(out.is_empty());
    assert_eq!(statuses.lock().clone(), vec![Some("Fetching neighbors...".to_string()), None]);
    Ok(())
}

#[tokio::test]
async fn upload_returns_neighbors_and_query_point() -> anyhow::Result<()> {
    let body = r#"{"neighbors": [{"id": "a", "distance": 0.3}], "query": {"x": 2.0, "y": 3.5}}"#;
    let (base, head) = serve_once("200 OK", body).await?;
    let client = UploadNeighborsClient::new(&format!("{base}/upload"))?;
    let file = UploadFile { name: "lesion.png".to_string(), bytes: b"\x89PNG".to_vec() };

    let list = client.upload_neighbors(&file, &SearchOptions::new(16)).await?;

    assert_eq!(list.neighbors, vec![IdTuple::new("a", Some(0.3))]);
    assert_eq!(list.query_point, Some(Point { x: 2.0, y: 3.5 }));
    let head = head.await?;
    assert!(head.starts_with("POST /upload?k=16 "));
    assert!(head.to_ascii_lowercase().contains("multipart/form-data"));
    Ok(())
}
