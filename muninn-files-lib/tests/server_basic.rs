use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use muninn_files_lib::{server, Config, ServeError, ServerState};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::sleep;

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

fn pick_free_port() -> TestResult<SocketAddr> {
    let listener = StdTcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

fn make_tree() -> TestResult<TempDir> {
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("notes.txt"), "hello from notes")?;
    std::fs::write(dir.path().join("page.html"), "<html><body>page</body></html>")?;
    std::fs::write(dir.path().join("data.bin"), [0u8; 16])?;
    std::fs::create_dir(dir.path().join("docs"))?;
    std::fs::write(dir.path().join("docs").join("guide.pdf"), b"%PDF-1.4")?;
    Ok(dir)
}

fn make_config(listen: SocketAddr, root: &Path) -> Config {
    Config {
        listen,
        root_dir: root.to_path_buf(),
        static_dir: root.join("static"),
        simulate_work: false,
        unsafe_counters: false,
        max_rate: 100.0,
        read_timeout_ms: 200,
        simulate_delay_ms: 100,
    }
}

struct RunningServer {
    addr: SocketAddr,
    state: ServerState,
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<Result<(), ServeError>>,
}

async fn spawn_server(config: Config) -> TestResult<RunningServer> {
    let addr = config.listen;
    let config = Arc::new(config);
    let state = ServerState::from_config(&config);
    let (shutdown, rx) = watch::channel(false);
    let task = tokio::spawn({
        let config = config.clone();
        let state = state.clone();
        async move { server::run(config, state, rx).await }
    });
    // Give the server a moment to bind.
    sleep(Duration::from_millis(50)).await;
    Ok(RunningServer {
        addr,
        state,
        shutdown,
        task,
    })
}

async fn get(addr: SocketAddr, target: &str) -> TestResult<String> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!("GET {target} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;
    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    Ok(response)
}

async fn send_raw(addr: SocketAddr, raw: &str) -> TestResult<String> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(raw.as_bytes()).await?;
    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    Ok(response)
}

fn status_of(response: &str) -> Option<u16> {
    response.split(' ').nth(1)?.parse().ok()
}

#[tokio::test]
async fn serves_text_files_wrapped_in_html() -> TestResult<()> {
    let tree = make_tree()?;
    let srv = spawn_server(make_config(pick_free_port()?, tree.path())).await?;

    let response = get(srv.addr, "/notes.txt").await?;
    assert_eq!(status_of(&response), Some(200));
    assert!(response.contains("Content-Type: text/html; charset=utf-8"));
    assert!(response.contains("<pre>hello from notes</pre>"));
    assert_eq!(srv.state.counters.get("notes.txt"), 1);

    srv.task.abort();
    Ok(())
}

#[tokio::test]
async fn listing_shows_entries_and_request_counts() -> TestResult<()> {
    let tree = make_tree()?;
    let srv = spawn_server(make_config(pick_free_port()?, tree.path())).await?;

    let response = get(srv.addr, "/notes.txt").await?;
    assert_eq!(status_of(&response), Some(200));

    let listing = get(srv.addr, "/").await?;
    assert_eq!(status_of(&listing), Some(200));
    assert!(listing.contains("notes.txt"));
    assert!(listing.contains("requests: 1"));
    assert!(listing.contains("folder.png"));
    // The root itself is counted under its own key.
    assert_eq!(srv.state.counters.get("."), 1);

    srv.task.abort();
    Ok(())
}

#[tokio::test]
async fn download_query_sets_attachment_disposition() -> TestResult<()> {
    let tree = make_tree()?;
    let srv = spawn_server(make_config(pick_free_port()?, tree.path())).await?;

    let response = get(srv.addr, "/docs/guide.pdf?download=true").await?;
    assert_eq!(status_of(&response), Some(200));
    assert!(response.contains("Content-Type: application/octet-stream"));
    assert!(response.contains("Content-Disposition: attachment; filename=\"guide.pdf\""));
    // The counter key excludes the query string.
    assert_eq!(srv.state.counters.get("docs/guide.pdf"), 1);

    srv.task.abort();
    Ok(())
}

#[tokio::test]
async fn missing_files_return_404_and_still_count() -> TestResult<()> {
    let tree = make_tree()?;
    let srv = spawn_server(make_config(pick_free_port()?, tree.path())).await?;

    let response = get(srv.addr, "/ghost.txt").await?;
    assert_eq!(status_of(&response), Some(404));
    assert!(response.contains("<h1>404 Not Found</h1>"));
    assert_eq!(srv.state.counters.get("ghost.txt"), 1);

    srv.task.abort();
    Ok(())
}

#[tokio::test]
async fn unrecognized_extensions_return_404_but_still_count() -> TestResult<()> {
    let tree = make_tree()?;
    let srv = spawn_server(make_config(pick_free_port()?, tree.path())).await?;

    // The file exists on disk; only its extension keeps it from being served.
    let response = get(srv.addr, "/data.bin").await?;
    assert_eq!(status_of(&response), Some(404));
    assert_eq!(srv.state.counters.get("data.bin"), 1);

    srv.task.abort();
    Ok(())
}

#[tokio::test]
async fn malformed_request_lines_get_400_without_side_effects() -> TestResult<()> {
    let tree = make_tree()?;
    let srv = spawn_server(make_config(pick_free_port()?, tree.path())).await?;

    let one_token = send_raw(srv.addr, "GET\r\n\r\n").await?;
    assert_eq!(status_of(&one_token), Some(400));
    assert!(one_token.contains("Bad Request"));

    let short = send_raw(srv.addr, "GET /\r\n\r\n").await?;
    assert_eq!(status_of(&short), Some(400));

    let long = send_raw(srv.addr, "GET /a b HTTP/1.1\r\n\r\n").await?;
    assert_eq!(status_of(&long), Some(400));

    // Rejected before admission control or counting.
    assert!(srv.state.counters.is_empty());
    assert_eq!(srv.state.limiter.tracked_identities(), 0);

    srv.task.abort();
    Ok(())
}

#[tokio::test]
async fn burst_over_the_rate_is_denied_without_counting() -> TestResult<()> {
    let tree = make_tree()?;
    let mut config = make_config(pick_free_port()?, tree.path());
    config.max_rate = 2.0;
    let srv = spawn_server(config).await?;

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let response = get(srv.addr, "/notes.txt").await?;
        statuses.push(status_of(&response));
    }
    assert_eq!(statuses, [Some(200), Some(200), Some(429)]);

    let denied = get(srv.addr, "/notes.txt").await?;
    assert!(denied.contains("<h1>429 Too Many Requests</h1>"));

    // Denied requests never reach the counter store.
    assert_eq!(srv.state.counters.get("notes.txt"), 2);
    assert_eq!(srv.state.stats.denied(), 2);
    assert_eq!(srv.state.stats.total(), 4);

    srv.task.abort();
    Ok(())
}

#[tokio::test]
async fn idle_connections_close_silently() -> TestResult<()> {
    let tree = make_tree()?;
    let srv = spawn_server(make_config(pick_free_port()?, tree.path())).await?;

    let mut stream = TcpStream::connect(srv.addr).await?;
    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    assert!(response.is_empty(), "idle close must not write a response");
    assert_eq!(srv.state.stats.errors(), 0);

    srv.task.abort();
    Ok(())
}

#[tokio::test]
async fn naive_counters_lose_updates_under_concurrency() -> TestResult<()> {
    let tree = make_tree()?;
    let mut config = make_config(pick_free_port()?, tree.path());
    config.unsafe_counters = true;
    let srv = spawn_server(config).await?;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let addr = srv.addr;
        handles.push(tokio::spawn(async move { get(addr, "/notes.txt").await }));
    }
    for handle in handles {
        let response = handle.await??;
        assert_eq!(status_of(&response), Some(200));
    }

    let counted = srv.state.counters.get("notes.txt");
    assert!(
        counted < 20,
        "naive mode kept all {counted} increments despite overlap"
    );

    srv.task.abort();
    Ok(())
}

#[tokio::test]
async fn locked_counters_are_exact_under_concurrency() -> TestResult<()> {
    let tree = make_tree()?;
    let srv = spawn_server(make_config(pick_free_port()?, tree.path())).await?;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let addr = srv.addr;
        handles.push(tokio::spawn(async move { get(addr, "/notes.txt").await }));
    }
    for handle in handles {
        let response = handle.await??;
        assert_eq!(status_of(&response), Some(200));
    }

    assert_eq!(srv.state.counters.get("notes.txt"), 20);

    srv.task.abort();
    Ok(())
}

#[tokio::test]
async fn simulated_work_delays_the_response() -> TestResult<()> {
    let tree = make_tree()?;
    let mut config = make_config(pick_free_port()?, tree.path());
    config.simulate_work = true;
    config.simulate_delay_ms = 100;
    let srv = spawn_server(config).await?;

    let started = Instant::now();
    let response = get(srv.addr, "/notes.txt").await?;
    assert_eq!(status_of(&response), Some(200));
    assert!(started.elapsed() >= Duration::from_millis(100));

    srv.task.abort();
    Ok(())
}

#[tokio::test]
async fn graceful_shutdown_stops_accepting() -> TestResult<()> {
    let tree = make_tree()?;
    let srv = spawn_server(make_config(pick_free_port()?, tree.path())).await?;

    let response = get(srv.addr, "/notes.txt").await?;
    assert_eq!(status_of(&response), Some(200));

    srv.shutdown.send(true)?;
    srv.task.await??;

    assert!(TcpStream::connect(srv.addr).await.is_err());
    Ok(())
}

#[tokio::test]
async fn static_assets_and_template_override_are_honored() -> TestResult<()> {
    let tree = make_tree()?;
    let static_dir = tree.path().join("static");
    std::fs::create_dir(&static_dir)?;
    std::fs::write(static_dir.join("app.css"), "body { margin: 0 }")?;
    std::fs::write(
        static_dir.join("index.html"),
        "<p>override has {{ files | length }} rows</p>",
    )?;
    let srv = spawn_server(make_config(pick_free_port()?, tree.path())).await?;

    let css = get(srv.addr, "/static/app.css").await?;
    assert_eq!(status_of(&css), Some(200));
    assert!(css.contains("Content-Type: text/css"));
    assert!(css.contains("body { margin: 0 }"));
    assert_eq!(srv.state.counters.get("static/app.css"), 1);

    let listing = get(srv.addr, "/").await?;
    assert_eq!(status_of(&listing), Some(200));
    assert!(listing.contains("override has"));

    srv.task.abort();
    Ok(())
}

#[tokio::test]
async fn percent_encoded_paths_reach_decoded_files() -> TestResult<()> {
    let tree = make_tree()?;
    std::fs::write(tree.path().join("my notes.txt"), "spaced out")?;
    let srv = spawn_server(make_config(pick_free_port()?, tree.path())).await?;

    let response = get(srv.addr, "/my%20notes.txt").await?;
    assert_eq!(status_of(&response), Some(200));
    assert!(response.contains("<pre>spaced out</pre>"));
    assert_eq!(srv.state.counters.get("my notes.txt"), 1);

    srv.task.abort();
    Ok(())
}

#[tokio::test]
async fn works_with_an_http_client_library() -> TestResult<()> {
    let tree = make_tree()?;
    let srv = spawn_server(make_config(pick_free_port()?, tree.path())).await?;

    let response = reqwest::get(format!("http://{}/", srv.addr)).await?;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body = response.text().await?;
    assert!(body.contains("requests:"));
    assert!(body.contains("notes.txt"));

    srv.task.abort();
    Ok(())
}
