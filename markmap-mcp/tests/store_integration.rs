use std::path::PathBuf;

use markmap_core::contract::{MockViewer, ObjectStore};
use markmap_core::publish::{publish, PublishRequest};
use markmap_mcp::minio::{MinioConfig, MinioStore, DEFAULT_REGION};
use markmap_mcp::oss::{OssConfig, OssStore, DEFAULT_SIGNED_URL_EXPIRY_SECS};
use tempfile::{tempdir, TempDir};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BODY: &str = "<html>hi</html>";
const BODY_SHA256: &str = "beb6d42e2e372ff35ff73af2a4bd53d0e440f07180b89ea67136a92c8f80a8ba";

fn oss_store(server: &MockServer) -> OssStore {
    OssStore::new(OssConfig {
        access_key_id: "id".to_string(),
        access_key_secret: "secret".to_string(),
        endpoint: server.uri(),
        bucket: "demo-bucket".to_string(),
        region: "oss-cn-beijing".to_string(),
        signed_url_expiry_secs: DEFAULT_SIGNED_URL_EXPIRY_SECS,
        path_style: true,
    })
}

fn minio_store(server: &MockServer, preview_url_base: Option<&str>) -> MinioStore {
    MinioStore::new(MinioConfig {
        access_key: "minio".to_string(),
        secret_key: "minio-secret".to_string(),
        endpoint: server.uri(),
        bucket: "page".to_string(),
        region: DEFAULT_REGION.to_string(),
        preview_url_base: preview_url_base.map(str::to_string),
    })
}

fn local_file() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let file = dir.path().join("a.html");
    std::fs::write(&file, BODY).unwrap();
    (dir, file)
}

async fn authorization_of_first_request(server: &MockServer) -> String {
    let requests = server.received_requests().await.expect("recording enabled");
    requests[0]
        .headers
        .get("authorization")
        .expect("authorization header")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn oss_put_uploads_and_returns_signed_url() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/demo-bucket/markmap/a.html"))
        .and(header("content-type", "text/html; charset=utf-8"))
        .and(body_string(BODY))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let (_dir, file) = local_file();

    let stored = oss_store(&server)
        .put(&file, "markmap/a.html")
        .await
        .expect("upload should succeed");

    assert_eq!(stored.name, "markmap/a.html");
    assert!(
        stored.url.starts_with(&format!(
            "{}/demo-bucket/markmap/a.html?OSSAccessKeyId=id&Expires=",
            server.uri()
        )),
        "unexpected url {}",
        stored.url
    );
    assert!(stored.url.contains("&Signature="));

    let auth = authorization_of_first_request(&server).await;
    assert!(auth.starts_with("OSS id:"), "unexpected authorization {auth}");
    assert_eq!(auth.len(), "OSS id:".len() + 28);
}

#[tokio::test]
async fn oss_put_surfaces_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_string("AccessDenied"))
        .mount(&server)
        .await;
    let (_dir, file) = local_file();

    let err = oss_store(&server)
        .put(&file, "markmap/a.html")
        .await
        .unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("403") && msg.contains("AccessDenied"), "{msg}");
}

#[tokio::test]
async fn oss_exists_and_delete() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/demo-bucket/markmap/present.html"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/demo-bucket/markmap/missing.html"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/demo-bucket/markmap/present.html"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let store = oss_store(&server);

    assert!(store.exists("markmap/present.html").await.unwrap());
    assert!(!store.exists("markmap/missing.html").await.unwrap());
    store.delete("markmap/present.html").await.unwrap();
}

#[tokio::test]
async fn minio_put_signs_with_sigv4_and_returns_preview_url() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/page/markmap/a.html"))
        .and(header("x-amz-content-sha256", BODY_SHA256))
        .and(body_string(BODY))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let (_dir, file) = local_file();

    let stored = minio_store(&server, Some("https://preview.example.com/page"))
        .put(&file, "markmap/a.html")
        .await
        .expect("upload should succeed");

    assert_eq!(stored.url, "https://preview.example.com/page/markmap/a.html");

    let auth = authorization_of_first_request(&server).await;
    assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=minio/"), "{auth}");
    assert!(auth.contains("/us-east-1/s3/aws4_request, "));
    assert!(auth.contains("SignedHeaders=content-type;host;x-amz-content-sha256;x-amz-date, "));
    let signature = auth.rsplit("Signature=").next().unwrap();
    assert_eq!(signature.len(), 64);
    assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn minio_exists_maps_404_to_false() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let exists = minio_store(&server, None)
        .exists("markmap/a.html")
        .await
        .unwrap();

    assert!(!exists);
}

#[tokio::test]
async fn forced_publish_uploads_to_both_stores() {
    let oss_server = MockServer::start().await;
    let minio_server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&oss_server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&minio_server)
        .await;
    let oss = oss_store(&oss_server);
    let minio = minio_store(&minio_server, None);
    let out = tempdir().unwrap();
    let viewer = MockViewer::new();

    let result = publish(
        PublishRequest {
            content: "# Topic\n- a\n- b",
            force_remote_upload: true,
            primary_store: Some(&oss),
            secondary_store: Some(&minio),
            ..Default::default()
        },
        out.path(),
        &viewer,
    )
    .await
    .expect("publish should succeed");

    assert!(result.uploaded_to_primary && result.uploaded_to_secondary);
    assert!(result
        .secondary_url
        .unwrap()
        .starts_with(&format!("{}/page/markmap/markmap-", minio_server.uri())));
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}
