//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves fixed responses by request path. Unknown paths get 404. Each
//! response closes the connection.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub body: Vec<u8>,
    /// Advertised length; defaults to the body length
    pub content_length: Option<u64>,
}

impl Route {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_length: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            content_length: None,
        }
    }

    /// Claim a longer body than is actually sent
    pub fn truncated(body: impl Into<Vec<u8>>, claimed: u64) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_length: Some(claimed),
        }
    }
}

/// Starts a server in a background thread. Returns the base URL without a
/// trailing slash (e.g. "http://127.0.0.1:12345"). The server runs until
/// the process exits.
pub fn start(routes: Vec<(&str, Route)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let routes: Arc<HashMap<String, Route>> = Arc::new(
        routes
            .into_iter()
            .map(|(path, route)| (path.to_string(), route))
            .collect(),
    );
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = Arc::clone(&routes);
            thread::spawn(move || handle(stream, &routes));
        }
    });
    format!("http://127.0.0.1:{}", port)
}

fn handle(mut stream: std::net::TcpStream, routes: &HashMap<String, Route>) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let route = routes.get(path).cloned().unwrap_or_else(|| Route::status(404));
    let length = route.content_length.unwrap_or(route.body.len() as u64);
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        route.status,
        reason(route.status),
        length
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&route.body);
    let _ = stream.flush();
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
