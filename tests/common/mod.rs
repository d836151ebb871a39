//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use tle_forwarder::config::{GatewayConfig, UpstreamConfig};
use tle_forwarder::LookupService;

pub const ISS_TLE: &str = "ISS (ZARYA)\n\
1 25544U 98067A   24001.50000000  .00016717  00000-0  10270-3 0  9005\n\
2 25544  51.6400 208.9163 0006317  69.9862  25.2906 15.49815308432533";

/// Request targets (`/path?query`) seen by a stub upstream, in arrival order.
#[derive(Clone, Default)]
pub struct Recorded(Arc<Mutex<Vec<String>>>);

#[allow(dead_code)]
impl Recorded {
    pub fn targets(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

/// Start a programmable upstream. Each request is answered by `f`, which
/// receives the request target and returns status and body.
#[allow(dead_code)]
pub async fn start_programmable_upstream<F, Fut>(f: F) -> (SocketAddr, Recorded)
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorded = Recorded::default();
    let seen = recorded.clone();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    let seen = seen.clone();
                    tokio::spawn(async move {
                        let Some(target) = read_request_target(&mut socket).await else {
                            return;
                        };
                        seen.0.lock().unwrap().push(target.clone());

                        let (status, body) = f(target).await;
                        let response = format!(
                            "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            reason(status),
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, recorded)
}

/// Start an upstream that always answers with the same status and body.
#[allow(dead_code)]
pub async fn start_fixed_upstream(status: u16, body: &'static str) -> (SocketAddr, Recorded) {
    start_programmable_upstream(move |_| async move { (status, body.to_string()) }).await
}

/// Start an upstream that promises more body than it sends, then hangs up.
#[allow(dead_code)]
pub async fn start_truncating_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_request_target(&mut socket).await.is_none() {
                    return;
                }
                let head = "HTTP/1.1 200 OK\r\nContent-Length: 4096\r\nConnection: close\r\n\r\n1 25544U";
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start an upstream that sends headers and the start of the body, then
/// stalls with the connection open.
#[allow(dead_code)]
pub async fn start_stalling_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_request_target(&mut socket).await.is_none() {
                    return;
                }
                let head = "HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n1 25544U";
                let _ = socket.write_all(head.as_bytes()).await;
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
        }
    });

    addr
}

/// Start an upstream that reads each request and never answers. The
/// returned `Notify` fires whenever a caller hangs up on it.
#[allow(dead_code)]
pub async fn start_hanging_upstream() -> (SocketAddr, Recorded, Arc<Notify>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorded = Recorded::default();
    let seen = recorded.clone();
    let abandoned = Arc::new(Notify::new());
    let hung_up = abandoned.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let seen = seen.clone();
            let hung_up = hung_up.clone();
            tokio::spawn(async move {
                let Some(target) = read_request_target(&mut socket).await else {
                    return;
                };
                seen.0.lock().unwrap().push(target);

                let mut buf = [0u8; 256];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => continue,
                    }
                }
                hung_up.notify_one();
            });
        }
    });

    (addr, recorded, abandoned)
}

/// An address on which nothing is listening.
#[allow(dead_code)]
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Gateway config pointing at a stub upstream, with ephemeral listen ports.
#[allow(dead_code)]
pub fn gateway_config(upstream: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.http.bind_address = "127.0.0.1:0".into();
    config.coap.bind_address = "127.0.0.1:0".into();
    config.upstream = upstream_config(upstream);
    config
}

#[allow(dead_code)]
pub fn upstream_config(upstream: SocketAddr) -> UpstreamConfig {
    UpstreamConfig {
        base_url: format!("http://{}/NORAD/elements/gp.php", upstream),
        connect_timeout_secs: 2,
        timeout_secs: 5,
        ..UpstreamConfig::default()
    }
}

#[allow(dead_code)]
pub fn lookup_service(upstream: SocketAddr) -> Arc<LookupService> {
    Arc::new(LookupService::new(&upstream_config(upstream)).unwrap())
}

async fn read_request_target(socket: &mut tokio::net::TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&buf);
    head.lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
