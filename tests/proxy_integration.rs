//! Proxy path tests over real TCP connections
//!
//! A thread-local upstream accepts one connection per test, records the
//! request it saw, answers, and closes. The server under test relays
//! the upstream payload verbatim.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use pollserv::config::Config;
use pollserv::net::{resolver, ListenerSet};
use pollserv::server::{EventLoop, StopToken};

/// Spawn an upstream that serves one connection and reports the request
/// it received.
fn one_shot_upstream(response: &'static [u8]) -> (u16, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).unwrap();
        tx.send(String::from_utf8_lossy(&buf[..n]).into_owned())
            .unwrap();
        stream.write_all(response).unwrap();
        // Dropping the stream closes the upstream side and ends the relay
    });

    (port, rx)
}

fn start_proxy_server(port: u16, upstream_port: u16) -> (StopToken, thread::JoinHandle<()>) {
    let toml = format!(
        r#"
        [[server]]
        port = {port}
        server_names = ["localhost"]

        [[server.location]]
        uri = "/api"
        kind = "proxy"
        target = "127.0.0.1:{upstream_port}"
        "#
    );
    let config = Config::from_toml_str(&toml).unwrap();
    let proxies = resolver::resolve_proxy_targets(&config).unwrap();
    let listeners = ListenerSet::bind(&config).unwrap();

    let stop = StopToken::new();
    let loop_stop = stop.clone();
    let handle = thread::spawn(move || {
        EventLoop::new(config, proxies, listeners)
            .run(&loop_stop)
            .unwrap();
    });
    thread::sleep(Duration::from_millis(100));
    (stop, handle)
}

fn roundtrip(port: u16, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.write_all(request).unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    response
}

#[test]
fn relays_upstream_response_verbatim() {
    let upstream_payload: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 8\r\n\r\nupstream";
    let (upstream_port, seen) = one_shot_upstream(upstream_payload);
    let (stop, handle) = start_proxy_server(47631, upstream_port);

    let response = roundtrip(
        47631,
        b"GET /api/users HTTP/1.1\r\nHost: localhost:47631\r\n\r\n",
    );
    assert_eq!(response, upstream_payload);

    // The upstream saw the rewritten request
    let request = seen.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(request.starts_with("GET /users HTTP/1.1\r\n"));
    assert!(request.contains(&format!("Host: 127.0.0.1:{upstream_port}\r\n")));

    stop.stop();
    handle.join().unwrap();
}

#[test]
fn unreachable_upstream_is_502() {
    // Resolvable address, nothing listening behind it
    let dead = TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_port = dead.local_addr().unwrap().port();
    drop(dead);

    let (stop, handle) = start_proxy_server(47632, dead_port);

    let response = roundtrip(
        47632,
        b"GET /api HTTP/1.1\r\nHost: localhost:47632\r\n\r\n",
    );
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 502 Bad Gateway\r\n"));

    stop.stop();
    handle.join().unwrap();
}

#[test]
fn proxied_post_carries_body() {
    let upstream_payload: &[u8] = b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n";
    let (upstream_port, seen) = one_shot_upstream(upstream_payload);
    let (stop, handle) = start_proxy_server(47633, upstream_port);

    let response = roundtrip(
        47633,
        b"POST /api/items HTTP/1.1\r\nHost: localhost:47633\r\nContent-Length: 4\r\n\r\ndata",
    );
    assert_eq!(response, upstream_payload);

    let request = seen.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(request.starts_with("POST /items HTTP/1.1\r\n"));
    assert!(request.ends_with("\r\n\r\ndata"));

    stop.stop();
    handle.join().unwrap();
}
