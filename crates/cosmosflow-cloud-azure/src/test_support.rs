//! Local HTTP server standing in for ARM and the token endpoint

use crate::credential::{AzureCredential, ClientSecretCredential};
use cosmosflow_cloud::PollConfig;
use reqwest::StatusCode;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const TENANT: &str = "tenant";

/// One request seen by the server (token requests excluded)
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `"GET /path"` without the query string
    pub fn line(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Reply {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.to_string(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }
}

/// Handler arguments: the request, how many earlier requests hit the same
/// method and path, and the server's base URL
type Handler = dyn Fn(&Recorded, usize, &str) -> Reply + Send + Sync;

pub struct FakeArm {
    pub endpoint: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeArm {
    pub async fn start<H>(handler: H) -> Self
    where
        H: Fn(&Recorded, usize, &str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let base = endpoint.clone();
        let log = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(serve(stream, handler.clone(), log.clone(), base.clone()));
            }
        });

        Self { endpoint, requests }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.requests().iter().map(Recorded::line).collect()
    }

    /// Service principal whose token endpoint is this server
    pub fn credential(&self) -> AzureCredential {
        AzureCredential::ClientSecret(
            ClientSecretCredential::new(TENANT, "app", "secret").with_authority(&self.endpoint),
        )
    }
}

/// Millisecond polling so tests do not wait on real backoff
pub fn fast_poll() -> PollConfig {
    PollConfig {
        max_wait_secs: 5,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        multiplier: 1.0,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn serve(
    mut stream: TcpStream,
    handler: Arc<Handler>,
    log: Arc<Mutex<Vec<Recorded>>>,
    base: String,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut start = lines.next().unwrap_or_default().split(' ');
    let method = start.next().unwrap_or_default().to_string();
    let target = start.next().unwrap_or_default();
    let path = target.split('?').next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let length: usize = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0);
    while buf.len() < header_end + length {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    let request = Recorded {
        method,
        path,
        headers,
        body,
    };

    let reply = if request.path == format!("/{}/oauth2/v2.0/token", TENANT) {
        Reply::json(200, r#"{"access_token":"test-token","expires_in":3600}"#)
    } else {
        let seen = {
            let mut log = log.lock().unwrap();
            let seen = log.iter().filter(|r| r.line() == request.line()).count();
            log.push(request.clone());
            seen
        };
        handler(&request, seen, &base)
    };

    let reason = StatusCode::from_u16(reply.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let mut response = format!("HTTP/1.1 {} {}\r\nconnection: close\r\n", reply.status, reason);
    for (name, value) in &reply.headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    if reply.status != 204 {
        response.push_str(&format!("content-length: {}\r\n", reply.body.len()));
    }
    response.push_str("\r\n");
    response.push_str(&reply.body);

    stream.write_all(response.as_bytes()).await.unwrap();
    stream.shutdown().await.ok();
}
