//! End-to-end tests over real TCP connections
//!
//! Each test starts the event loop on its own thread with a fixed port
//! and talks to it with plain `TcpStream`s. The server closes every
//! connection after responding, so `read_to_end` frames the response.

use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use pollserv::config::Config;
use pollserv::net::{resolver, ListenerSet};
use pollserv::server::{EventLoop, StopToken};

struct TestServer {
    stop: StopToken,
    handle: Option<thread::JoinHandle<()>>,
    port: u16,
}

impl TestServer {
    fn start(toml: &str, port: u16) -> Self {
        let config = Config::from_toml_str(toml).expect("config");
        let proxies = resolver::resolve_proxy_targets(&config).expect("resolve");
        let listeners = ListenerSet::bind(&config).expect("bind");

        let stop = StopToken::new();
        let loop_stop = stop.clone();
        let handle = thread::spawn(move || {
            EventLoop::new(config, proxies, listeners)
                .run(&loop_stop)
                .expect("event loop");
        });

        // Give the loop a moment to reach its first poll
        thread::sleep(Duration::from_millis(100));

        TestServer {
            stop,
            handle: Some(handle),
            port,
        }
    }

    fn request_raw(&self, bytes: &[u8]) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", self.port)).expect("connect");
        stream.write_all(bytes).expect("send");
        let mut response = Vec::new();
        stream.read_to_end(&mut response).expect("receive");
        String::from_utf8_lossy(&response).into_owned()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn static_site(port: u16) -> (TempDir, TestServer) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("index.html"), "<h1>welcome</h1>").unwrap();
    fs::write(dir.path().join("about.txt"), "about us").unwrap();

    let toml = format!(
        r#"
        [[server]]
        port = {port}
        server_names = ["localhost"]

        [[server.location]]
        uri = "/"
        kind = "root"
        root = "{root}"
        index = ["index.html"]
        methods = {{ get = true, delete = true }}
        "#,
        root = dir.path().display()
    );
    let server = TestServer::start(&toml, port);
    (dir, server)
}

#[test]
fn serves_index_file() {
    let (_dir, server) = static_site(47611);

    let response =
        server.request_raw(b"GET / HTTP/1.1\r\nHost: localhost:47611\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Type: text/html\r\n"));
    assert!(response.ends_with("<h1>welcome</h1>"));
}

#[test]
fn serves_plain_file() {
    let (_dir, server) = static_site(47612);

    let response =
        server.request_raw(b"GET /about.txt HTTP/1.1\r\nHost: localhost:47612\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Type: text/plain\r\n"));
    assert!(response.ends_with("about us"));
}

#[test]
fn missing_path_is_404() {
    let (_dir, server) = static_site(47613);

    let response =
        server.request_raw(b"GET /nope HTTP/1.1\r\nHost: localhost:47613\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
}

#[test]
fn unknown_host_is_404() {
    let (_dir, server) = static_site(47614);

    let response =
        server.request_raw(b"GET / HTTP/1.1\r\nHost: stranger:1\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
}

#[test]
fn disallowed_method_is_405() {
    let (_dir, server) = static_site(47615);

    let response =
        server.request_raw(b"POST / HTTP/1.1\r\nHost: localhost:47615\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
}

#[test]
fn old_protocol_is_505() {
    let (_dir, server) = static_site(47616);

    let response =
        server.request_raw(b"GET / HTTP/1.0\r\nHost: localhost:47616\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 505 HTTP Version Not Supported\r\n"));
}

#[test]
fn malformed_request_is_400() {
    let (_dir, server) = static_site(47617);

    let response = server.request_raw(b"complete nonsense\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}

#[test]
fn partial_writes_assemble_into_one_request() {
    let (_dir, server) = static_site(47618);

    // Same request as serves_index_file, dribbled out in fragments
    let mut stream = TcpStream::connect(("127.0.0.1", 47618)).unwrap();
    for chunk in [
        &b"GET / HT"[..],
        &b"TP/1.1\r\nHo"[..],
        &b"st: localhost:47618"[..],
        &b"\r\n\r\n"[..],
    ] {
        stream.write_all(chunk).unwrap();
        stream.flush().unwrap();
        thread::sleep(Duration::from_millis(30));
    }

    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("<h1>welcome</h1>"));

    let whole = server
        .request_raw(b"GET / HTTP/1.1\r\nHost: localhost:47618\r\n\r\n");
    assert_eq!(response, whole);
}

#[test]
fn delete_removes_file() {
    let (dir, server) = static_site(47619);

    let response =
        server.request_raw(b"DELETE /about.txt HTTP/1.1\r\nHost: localhost:47619\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 204 No Content\r\n"));
    assert!(!dir.path().join("about.txt").exists());
}

#[test]
fn serves_many_sequential_connections() {
    let (_dir, server) = static_site(47620);

    for _ in 0..10 {
        let response =
            server.request_raw(b"GET / HTTP/1.1\r\nHost: localhost:47620\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    }
}

#[test]
fn multipart_body_waits_for_closing_boundary() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("index.html"), "up").unwrap();
    let toml = format!(
        r#"
        [[server]]
        port = 47621
        server_names = ["localhost"]

        [[server.location]]
        uri = "/"
        kind = "root"
        root = "{root}"
        index = ["index.html"]
        methods = {{ get = true, post = true }}
        "#,
        root = dir.path().display()
    );
    let server = TestServer::start(&toml, 47621);

    // Content-Length declares 3 bytes but the multipart body is longer;
    // the server must wait for the closing boundary before responding.
    let body = b"--B\r\nContent-Disposition: form-data; name=f\r\n\r\npayload\r\n--B--";
    let head = "POST / HTTP/1.1\r\nHost: localhost:47621\r\nContent-Length: 3\r\n\
                Content-Type: multipart/form-data; boundary=B\r\n\r\n";

    let mut stream = TcpStream::connect(("127.0.0.1", 47621)).unwrap();
    stream.write_all(head.as_bytes()).unwrap();
    // Send most of the body, pause past the declared length, then finish
    stream.write_all(&body[..10]).unwrap();
    thread::sleep(Duration::from_millis(100));
    stream.write_all(&body[10..]).unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));

    drop(server);
}
