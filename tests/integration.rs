use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use httpd_core::{Application, Params, Request, Response, Route, ServerError};

fn spawn_demo_app(static_root: std::path::PathBuf) -> (std::net::SocketAddr, Application) {
    let app = Application::builder()
        .route(Route::post("/upper", Box::new(upper)))
        .route(Route::static_files("/static/", static_root))
        .build();

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    (addr, app)
}

fn upper(
    _req: &Request<'_>,
    _params: &Params<'_>,
    body: &mut dyn Read,
    response: &mut Response<'_>,
) -> Result<(), ServerError> {
    let mut buf = Vec::new();
    body.read_to_end(&mut buf)?;
    buf.make_ascii_uppercase();
    response.set_body(buf);
    Ok(())
}

fn run_server(addr: std::net::SocketAddr, app: Application) -> (thread::JoinHandle<()>, std::sync::Arc<std::sync::atomic::AtomicBool>) {
    let handle = app.shutdown_handle();
    let t = thread::spawn(move || {
        let _ = app.serve(addr);
    });
    thread::sleep(Duration::from_millis(100));
    (t, handle)
}

fn request(addr: std::net::SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(raw).unwrap();
    stream.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn shutdown(addr: std::net::SocketAddr, t: thread::JoinHandle<()>, flag: std::sync::Arc<std::sync::atomic::AtomicBool>) {
    flag.store(true, Ordering::Relaxed);
    let _ = TcpStream::connect(addr);
    t.join().unwrap();
}

#[test]
fn minimal_get_with_no_matching_route_yields_404() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, app) = spawn_demo_app(dir.path().to_path_buf());
    let (t, flag) = run_server(addr, app);

    let resp = request(addr, b"GET / HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n");
    assert!(resp.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(resp.contains("Content-Type: text/html"));
    assert!(resp.ends_with("not found"));

    shutdown(addr, t, flag);
}

#[test]
fn keep_alive_pipelining_answers_both_requests_on_one_socket() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, app) = spawn_demo_app(dir.path().to_path_buf());
    let (t, flag) = run_server(addr, app);

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: a\r\n\r\nGET / HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n")
        .unwrap();
    stream.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
    }
    let text = String::from_utf8_lossy(&out);
    assert_eq!(text.matches("HTTP/1.1 404 Not Found").count(), 2);

    shutdown(addr, t, flag);
}

#[test]
fn static_file_range_request_yields_206() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("file.txt"), b"hello").unwrap();
    let (addr, app) = spawn_demo_app(dir.path().to_path_buf());
    let (t, flag) = run_server(addr, app);

    let resp = request(
        addr,
        b"GET /static/file.txt HTTP/1.1\r\nHost: a\r\nRange: bytes=0-3\r\nConnection: close\r\n\r\n",
    );
    assert!(resp.starts_with("HTTP/1.1 206 Partial Content\r\n"));
    assert!(resp.contains("Content-Range: bytes 0-3/5"));
    assert!(resp.contains("Content-Length: 4"));
    assert!(resp.ends_with("hell"));

    shutdown(addr, t, flag);
}

#[test]
fn static_file_unsatisfiable_range_yields_416() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("file.txt"), b"hello").unwrap();
    let (addr, app) = spawn_demo_app(dir.path().to_path_buf());
    let (t, flag) = run_server(addr, app);

    let resp = request(
        addr,
        b"GET /static/file.txt HTTP/1.1\r\nHost: a\r\nRange: bytes=100-200\r\nConnection: close\r\n\r\n",
    );
    assert!(resp.starts_with("HTTP/1.1 416 Range Not Satisfiable\r\n"));
    assert!(resp.contains("Content-Range: bytes */5"));

    shutdown(addr, t, flag);
}

#[test]
fn post_with_chunked_body_is_observed_whole_by_handler() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, app) = spawn_demo_app(dir.path().to_path_buf());
    let (t, flag) = run_server(addr, app);

    let resp = request(
        addr,
        b"POST /upper HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n5\r\nhello\r\n0\r\n\r\n",
    );
    assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(resp.ends_with("HELLO"));

    shutdown(addr, t, flag);
}

#[test]
fn malformed_http_version_yields_505_and_closes() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, app) = spawn_demo_app(dir.path().to_path_buf());
    let (t, flag) = run_server(addr, app);

    let resp = request(addr, b"GET / HTTP/2.0\r\n\r\n");
    assert!(resp.starts_with("HTTP/1.1 505 HTTP Version Not Supported\r\n"));

    shutdown(addr, t, flag);
}
