//! Integration tests for toolchain downloads against a local HTTP server.

use axum::extract::Path as UrlPath;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect};
use axum::routing::get;
use axum::Router;
use mql_compile::{ArtifactFetcher, FetchError, FetchOutcome};
use tempfile::tempdir;

const ARCHIVE: &[u8] = b"PK\x05\x06 fake toolchain archive";

async fn archive() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/zip")], ARCHIVE)
}

async fn hop(UrlPath(n): UrlPath<u32>) -> Redirect {
    if n == 0 {
        Redirect::temporary("/releases/mt-5.0.0.2361.zip")
    } else {
        Redirect::temporary(&format!("/hop/{}", n - 1))
    }
}

/// Serve the fixture routes on an ephemeral port and return the base URL.
async fn serve() -> String {
    let app = Router::new()
        .route("/releases/mt-5.0.0.2361.zip", get(archive))
        .route("/hop/{n}", get(hop))
        .route("/loop", get(|| async { Redirect::temporary("/loop") }))
        .route(
            "/releases/latest",
            get(|| async { Redirect::temporary("mt-5.0.0.2361.zip") }),
        )
        .route(
            "/broken",
            get(|| async { (StatusCode::FOUND, "no location header") }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Test: a direct download streams the body to disk.
#[tokio::test]
async fn test_direct_download() {
    let base = serve().await;
    let dir = tempdir().unwrap();
    let dest = dir.path().join("metaeditor5_run.zip");

    let outcome = ArtifactFetcher::new()
        .unwrap()
        .fetch(&format!("{base}/releases/mt-5.0.0.2361.zip"), &dest)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        FetchOutcome::Downloaded {
            bytes: ARCHIVE.len() as u64
        }
    );
    assert_eq!(std::fs::read(&dest).unwrap(), ARCHIVE);
}

/// Test: a redirect chain within the bound is followed to the body.
#[tokio::test]
async fn test_redirect_chain_is_followed() {
    let base = serve().await;
    let dir = tempdir().unwrap();
    let dest = dir.path().join("mt.zip");

    let outcome = ArtifactFetcher::new()
        .unwrap()
        .fetch(&format!("{base}/hop/3"), &dest)
        .await
        .unwrap();

    assert!(matches!(outcome, FetchOutcome::Downloaded { .. }));
    assert_eq!(std::fs::read(&dest).unwrap(), ARCHIVE);
}

/// Test: a relative Location resolves against the responding URL.
#[tokio::test]
async fn test_relative_redirect_location() {
    let base = serve().await;
    let dir = tempdir().unwrap();
    let dest = dir.path().join("mt.zip");

    ArtifactFetcher::new()
        .unwrap()
        .fetch(&format!("{base}/releases/latest"), &dest)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), ARCHIVE);
}

/// Test: a redirect loop stops at the bound.
#[tokio::test]
async fn test_redirect_loop_is_bounded() {
    let base = serve().await;
    let dir = tempdir().unwrap();
    let dest = dir.path().join("mt.zip");

    let err = ArtifactFetcher::new()
        .unwrap()
        .fetch(&format!("{base}/loop"), &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::TooManyRedirects { limit: 10, .. }));
    assert!(!dest.exists());
}

/// Test: a chain longer than a custom bound is rejected.
#[tokio::test]
async fn test_custom_redirect_bound() {
    let base = serve().await;
    let dir = tempdir().unwrap();
    let dest = dir.path().join("mt.zip");

    let err = ArtifactFetcher::with_max_redirects(2)
        .unwrap()
        .fetch(&format!("{base}/hop/5"), &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::TooManyRedirects { limit: 2, .. }));
}

/// Test: a 404 is a status error and leaves no file behind.
#[tokio::test]
async fn test_not_found_leaves_no_file() {
    let base = serve().await;
    let dir = tempdir().unwrap();
    let dest = dir.path().join("mt.zip");

    let err = ArtifactFetcher::new()
        .unwrap()
        .fetch(&format!("{base}/releases/mt-9.9.9.zip"), &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 404, .. }));
    assert!(!dest.exists());
}

/// Test: a redirect status without Location is a status error.
#[tokio::test]
async fn test_redirect_without_location() {
    let base = serve().await;
    let dir = tempdir().unwrap();

    let err = ArtifactFetcher::new()
        .unwrap()
        .fetch(&format!("{base}/broken"), &dir.path().join("mt.zip"))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 302, .. }));
}

/// Serve one raw HTTP response per connection, then close, and return the URL.
async fn serve_raw(response: &'static [u8]) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(response).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{}/mt.zip", addr)
}

/// Test: a body cut short mid-stream removes the partial download.
#[tokio::test]
async fn test_interrupted_body_removes_partial_file() {
    let url = serve_raw(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n0123456789").await;
    let dir = tempdir().unwrap();
    let dest = dir.path().join("mt.zip");

    let err = ArtifactFetcher::new()
        .unwrap()
        .fetch(&url, &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Http(_)), "got {err:?}");
    assert!(!dest.exists());
}

/// Test: a close-delimited body is written whole.
#[tokio::test]
async fn test_close_delimited_body() {
    let url = serve_raw(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n0123456789").await;
    let dir = tempdir().unwrap();
    let dest = dir.path().join("mt.zip");

    let outcome = ArtifactFetcher::new()
        .unwrap()
        .fetch(&url, &dest)
        .await
        .unwrap();

    assert_eq!(outcome, FetchOutcome::Downloaded { bytes: 10 });
    assert_eq!(std::fs::read(&dest).unwrap(), b"0123456789");
}
