//! Static site hosting of the built web UI.

use fitcoach::config::ServerConfig;
use fitcoach::server::StaticSiteServer;

fn dist() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<!doctype html><div id=app></div>").unwrap();
    std::fs::create_dir_all(dir.path().join("assets")).unwrap();
    std::fs::write(dir.path().join("assets").join("main.css"), "body{margin:0}").unwrap();
    dir
}

async fn start(dir: &tempfile::TempDir) -> (StaticSiteServer, String) {
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        dist_dir: dir.path().to_path_buf(),
        ..ServerConfig::default()
    };
    let server = StaticSiteServer::start(&config).await.unwrap();
    let base = format!("http://{}", server.addr());
    (server, base)
}

#[tokio::test]
async fn unknown_routes_get_the_entry_document() {
    let dir = dist();
    let (server, base) = start(&dir).await;

    for route in ["/", "/session", "/title/select?trainer=B"] {
        let response = reqwest::get(format!("{base}{route}")).await.unwrap();
        assert_eq!(response.status(), 200, "{route}");
        assert_eq!(
            response.text().await.unwrap(),
            "<!doctype html><div id=app></div>",
            "{route}"
        );
    }

    server.shutdown().await;
}

#[tokio::test]
async fn existing_files_are_served_as_is() {
    let dir = dist();
    let (server, base) = start(&dir).await;

    let css = reqwest::get(format!("{base}/assets/main.css")).await.unwrap();
    assert_eq!(css.status(), 200);
    assert_eq!(css.headers()["content-type"].to_str().unwrap(), "text/css");
    assert_eq!(css.text().await.unwrap(), "body{margin:0}");

    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_serving() {
    let dir = dist();
    let (server, base) = start(&dir).await;
    let port = server.port();
    assert_ne!(port, 0);
    server.shutdown().await;

    assert!(reqwest::get(format!("{base}/")).await.is_err());
}
