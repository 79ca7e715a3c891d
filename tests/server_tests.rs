#![cfg(unix)]

use reqwest::StatusCode;
use std::io::Cursor;
use std::path::Path;
use tumblrzip::ServerConfig;
use tumblrzip::server;

fn sh_config(root: &Path, script: &str) -> ServerConfig {
    let mut cfg = ServerConfig::new("127.0.0.1");
    cfg.port = 0;
    cfg.workspace_root = root.to_path_buf();
    cfg.extractor_program = "sh".to_string();
    cfg.extractor_args = vec!["-c".to_string(), script.to_string(), "sh".to_string()];
    cfg
}

/// Start a server on an ephemeral port; returns its base URL.
async fn start(cfg: ServerConfig) -> String {
    let listener = server::bind(&cfg).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        server::serve(listener, &cfg, std::future::pending()).await.unwrap();
    });
    format!("http://{addr}")
}

fn header<'a>(resp: &'a reqwest::Response, name: &str) -> &'a str {
    resp.headers().get(name).unwrap().to_str().unwrap()
}

fn zip_file_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut names: Vec<String> = (0..archive.len())
        .filter_map(|i| {
            let f = archive.by_index(i).unwrap();
            f.is_file().then(|| f.name().to_string())
        })
        .collect();
    names.sort();
    names
}

const THREE_FILES: &str = r#"mkdir -p "$1/posts" && echo a > "$1/index.html" && echo b > "$1/posts/1.html" && echo c > "$1/posts/2.html""#;

#[tokio::test]
async fn test_download_success_streams_zip() {
    let tmp = tempfile::tempdir().unwrap();
    let base = start(sh_config(tmp.path(), THREE_FILES)).await;

    let resp = reqwest::get(format!("{base}/download?tumblr=myblog"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, "content-type"), "application/zip");
    assert_eq!(
        header(&resp, "content-disposition"),
        "attachment; filename=\"myblog.zip\""
    );
    let bytes = resp.bytes().await.unwrap();
    assert_eq!(
        zip_file_names(&bytes),
        vec![
            "myblog/index.html",
            "myblog/posts/1.html",
            "myblog/posts/2.html"
        ]
    );
    assert!(!tmp.path().join("myblog").exists());
}

#[tokio::test]
async fn test_download_missing_param_is_400() {
    let tmp = tempfile::tempdir().unwrap();
    let base = start(sh_config(tmp.path(), THREE_FILES)).await;

    for url in [format!("{base}/download"), format!("{base}/download?tumblr=")] {
        let resp = reqwest::get(url).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            resp.text().await.unwrap(),
            "Bad Request: tumblr parameter required"
        );
    }
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_download_bad_name_is_400() {
    let tmp = tempfile::tempdir().unwrap();
    let base = start(sh_config(tmp.path(), THREE_FILES)).await;

    let resp = reqwest::get(format!("{base}/download?tumblr=bad%2Fname"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let text = resp.text().await.unwrap();
    assert!(text.contains("^[A-Za-z0-9_-]+$"), "{text}");
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_download_job_failure_is_500_then_retry_succeeds() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("fail-once"), b"").unwrap();
    let script = r#"if [ -e fail-once ]; then rm fail-once; mkdir -p "$1"; echo "token=hunter2 in $PWD" >&2; exit 1; fi; mkdir -p "$1" && echo ok > "$1/ok.txt""#;
    let base = start(sh_config(tmp.path(), script)).await;
    let url = format!("{base}/download?tumblr=blogname");

    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = resp.text().await.unwrap();
    assert_eq!(
        text,
        "Internal Server Error: couldn't retrieve tumblr: sh exit status: 1"
    );
    assert!(!text.contains("hunter2"));
    assert!(!tmp.path().join("blogname").exists());

    let resp = tokio::time::timeout(std::time::Duration::from_secs(10), reqwest::get(&url))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.bytes().await.unwrap();
    assert_eq!(zip_file_names(&bytes), vec!["blogname/ok.txt"]);
    assert!(!tmp.path().join("blogname").exists());
}

#[tokio::test]
async fn test_download_timeout_is_504() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = sh_config(tmp.path(), "sleep 5");
    cfg.request_timeout = Some(std::time::Duration::from_millis(200));
    let base = start(cfg).await;

    let resp = reqwest::get(format!("{base}/download?tumblr=slow"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_download_client_disconnect_stops_job() {
    use tokio::io::AsyncWriteExt;

    let tmp = tempfile::tempdir().unwrap();
    let script = r#"mkdir -p "$1"; sleep 1; touch "$1.done""#;
    let base = start(sh_config(tmp.path(), script)).await;
    let addr = base.trim_start_matches("http://");

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /download?tumblr=blog HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    drop(stream);

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    assert!(!tmp.path().join("blog.done").exists());
    assert!(!tmp.path().join("blog").exists());
}

#[tokio::test]
async fn test_banner() {
    let tmp = tempfile::tempdir().unwrap();
    let base = start(sh_config(tmp.path(), THREE_FILES)).await;
    let text = reqwest::get(format!("{base}/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains("/download?tumblr="));
}
