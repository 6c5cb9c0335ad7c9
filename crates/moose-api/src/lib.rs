//! moose2 adapter.
//!
//! Implements `MooseService` against the moose2 HTTP API: name resolution,
//! IRC art, search, and image/gallery links.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use moose_core::{
    errors::Error,
    ports::{MooseService, SearchHit},
    Result,
};

/// Longest single line of IRC art we accept.
pub const MAX_LINE_LEN: usize = 4096;
/// Cap on the whole IRC art body.
pub const MAX_BODY_LEN: usize = 1024 * 1024;

const USER_AGENT: &str = concat!("moose/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ResolveBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    #[serde(default)]
    result: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    page: u32,
    moose: SearchMoose,
}

#[derive(Debug, Deserialize)]
struct SearchMoose {
    name: String,
}

#[derive(Clone, Debug)]
pub struct MooseClient {
    base: Url,
    http: reqwest::Client,
}

impl MooseClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| Error::Config(format!("invalid moose url {base_url:?}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "moose url {base_url:?} cannot be used as a base"
            )));
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;

        Ok(Self { base, http })
    }

    fn base_str(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// Append path segments, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn resolve_url(&self, name: &str) -> Url {
        self.endpoint(&["api-helper", "resolve", name])
    }

    // Resolved names come back already encoded, so they are appended verbatim.
    fn irc_url(&self, name: &str) -> String {
        format!("{}/irc/{name}", self.base_str())
    }
}

#[async_trait]
impl MooseService for MooseClient {
    async fn resolve(&self, name: &str) -> Result<String> {
        let resp = self
            .http
            .get(self.resolve_url(name))
            .send()
            .await
            .map_err(transport)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(name.to_string()));
        }
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        let body: ResolveBody = resp
            .json()
            .await
            .map_err(|e| Error::Transport(format!("invalid moose resolver response: {e}")))?;
        if body.status == "error" {
            return Err(Error::Transport(body.msg));
        }
        debug!(%name, resolved = %body.msg, "resolved moose");
        Ok(body.msg)
    }

    async fn fetch_image_lines(&self, name: &str) -> Result<Vec<String>> {
        let mut resp = self
            .http
            .get(self.irc_url(name))
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(transport)? {
            if body.len() + chunk.len() > MAX_BODY_LEN {
                return Err(Error::Transport(
                    "moose response exceeded the size limit".to_string(),
                ));
            }
            body.extend_from_slice(&chunk);
        }

        split_lines(&body, MAX_LINE_LEN)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let resp = self
            .http
            .get(self.endpoint(&["search"]))
            .query(&[("p", "0"), ("q", query)])
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        let txt = resp.text().await.map_err(transport)?;
        decode_search(&txt)
    }

    fn image_url(&self, name: &str) -> String {
        format!("{}/img/{name}", self.base_str())
    }

    fn gallery_url(&self, query: &str) -> String {
        let mut url = self.endpoint(&["gallery", "0"]);
        url.query_pairs_mut().append_pair("q", query);
        url.to_string()
    }
}

fn transport(e: reqwest::Error) -> Error {
    Error::Transport(format!("Failed to talk to moose service: {e}"))
}

async fn status_error(resp: reqwest::Response) -> Error {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let snippet = body.trim().chars().take(200).collect::<String>();
    if snippet.is_empty() {
        Error::Transport(format!("Unexpected status from moose service: {status}"))
    } else {
        Error::Transport(format!(
            "Unexpected status from moose service: {status} {snippet}"
        ))
    }
}

fn decode_search(txt: &str) -> Result<Vec<SearchHit>> {
    let body: SearchBody = serde_json::from_str(txt)
        .map_err(|e| Error::Transport(format!("Moose search result was malformed: {e}")))?;
    Ok(body
        .result
        .into_iter()
        .map(|r| SearchHit {
            name: r.moose.name,
            page: r.page,
        })
        .collect())
}

/// Split an art body into lines (`\n` or `\r\n`). A line longer than
/// `max_len` bytes means the body is not IRC art and aborts the whole fetch.
fn split_lines(body: &[u8], max_len: usize) -> Result<Vec<String>> {
    let body = body.strip_suffix(b"\n").unwrap_or(body);
    if body.is_empty() {
        return Ok(Vec::new());
    }

    body.split(|b| *b == b'\n')
        .map(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.len() > max_len {
                return Err(Error::Transport(
                    "Malformed moose line: line too long".to_string(),
                ));
            }
            Ok(String::from_utf8_lossy(line).into_owned())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        sync::oneshot,
    };

    fn client() -> MooseClient {
        MooseClient::new("https://moose.example/", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(matches!(
            MooseClient::new("not a url", Duration::from_secs(1)),
            Err(Error::Config(_))
        ));
        assert!(MooseClient::new("mailto:moose@example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn resolve_url_encodes_name() {
        let c = client();
        assert_eq!(
            c.resolve_url("big moose/2").as_str(),
            "https://moose.example/api-helper/resolve/big%20moose%2F2"
        );
        assert_eq!(
            c.resolve_url("random").as_str(),
            "https://moose.example/api-helper/resolve/random"
        );
    }

    #[test]
    fn base_path_is_preserved() {
        let c = MooseClient::new("http://localhost:5000/moose/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            c.resolve_url("x").as_str(),
            "http://localhost:5000/moose/api-helper/resolve/x"
        );
        assert_eq!(c.image_url("x"), "http://localhost:5000/moose/img/x");
    }

    #[test]
    fn image_and_irc_urls_use_resolved_name_verbatim() {
        let c = client();
        assert_eq!(c.image_url("big%20moose"), "https://moose.example/img/big%20moose");
        assert_eq!(c.irc_url("big%20moose"), "https://moose.example/irc/big%20moose");
    }

    #[test]
    fn gallery_url_encodes_query() {
        assert_eq!(
            client().gallery_url("big moose&co"),
            "https://moose.example/gallery/0?q=big+moose%26co"
        );
    }

    #[test]
    fn splits_crlf_and_lf_lines() {
        let lines = split_lines(b"one\r\ntwo\nthree\n", MAX_LINE_LEN).unwrap();
        assert_eq!(lines, vec!["one", "two", "three"]);
        assert!(split_lines(b"", MAX_LINE_LEN).unwrap().is_empty());
        assert_eq!(split_lines(b"a\n\nb", MAX_LINE_LEN).unwrap(), vec!["a", "", "b"]);
    }

    #[test]
    fn overlong_line_aborts() {
        let mut body = b"ok\n".to_vec();
        body.extend(std::iter::repeat(b'x').take(11));
        body.extend_from_slice(b"\nok\n");
        let err = split_lines(&body, 10).unwrap_err();
        assert!(err.to_string().contains("line too long"));
        assert!(split_lines(&body, 11).is_ok());
    }

    /// Answers one request with a canned response and hands back the
    /// request line it received.
    async fn serve_once(status: &str, body: Vec<u8>) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let head = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut req = Vec::new();
            let mut buf = [0u8; 1024];
            while !req.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                req.extend_from_slice(&buf[..n]);
            }
            let txt = String::from_utf8_lossy(&req);
            let _ = tx.send(txt.lines().next().unwrap_or_default().to_string());

            // The client may hang up early on oversized bodies.
            let _ = sock.write_all(head.as_bytes()).await;
            let _ = sock.write_all(&body).await;
            let _ = sock.shutdown().await;
        });

        (base, rx)
    }

    fn client_for(base: &str) -> MooseClient {
        MooseClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn resolve_returns_canonical_name() {
        let (base, req) = serve_once(
            "200 OK",
            br#"{"status":"ok","msg":"big%20moose"}"#.to_vec(),
        )
        .await;
        let name = client_for(&base).resolve("big moose").await.unwrap();
        assert_eq!(name, "big%20moose");
        assert_eq!(
            req.await.unwrap(),
            "GET /api-helper/resolve/big%20moose HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn resolve_404_is_not_found() {
        let (base, _req) = serve_once("404 Not Found", b"no".to_vec()).await;
        match client_for(&base).resolve("nope").await {
            Err(Error::NotFound(name)) => assert_eq!(name, "nope"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resolver_error_status_is_transport_error() {
        let (base, _req) = serve_once(
            "200 OK",
            br#"{"status":"error","msg":"database is asleep"}"#.to_vec(),
        )
        .await;
        match client_for(&base).resolve("random").await {
            Err(Error::Transport(msg)) => assert_eq!(msg, "database is asleep"),
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_is_transport_error_with_body() {
        let (base, _req) = serve_once("500 Internal Server Error", b"boom".to_vec()).await;
        match client_for(&base).resolve("random").await {
            Err(Error::Transport(msg)) => {
                assert!(msg.contains("500"), "{msg}");
                assert!(msg.contains("boom"), "{msg}");
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetches_art_lines() {
        let (base, req) = serve_once("200 OK", b"  /\\_/\\\r\n ( o.o )\n".to_vec()).await;
        let lines = client_for(&base)
            .fetch_image_lines("Bullwinkle")
            .await
            .unwrap();
        assert_eq!(lines, vec!["  /\\_/\\", " ( o.o )"]);
        assert_eq!(req.await.unwrap(), "GET /irc/Bullwinkle HTTP/1.1");
    }

    #[tokio::test]
    async fn oversized_art_body_aborts() {
        let body = b"x\n".repeat(MAX_BODY_LEN / 2 + 1);
        let (base, _req) = serve_once("200 OK", body).await;
        match client_for(&base).fetch_image_lines("huge").await {
            Err(Error::Transport(msg)) => assert!(msg.contains("size limit"), "{msg}"),
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn search_sends_query_and_decodes_hits() {
        let (base, req) = serve_once(
            "200 OK",
            br#"{"pages":1,"result":[{"page":0,"moose":{"name":"Bullwinkle"}}]}"#.to_vec(),
        )
        .await;
        let hits = client_for(&base).search("big moose").await.unwrap();
        assert_eq!(
            hits,
            vec![SearchHit {
                name: "Bullwinkle".to_string(),
                page: 0
            }]
        );
        assert_eq!(req.await.unwrap(), "GET /search?p=0&q=big+moose HTTP/1.1");
    }

    #[tokio::test]
    async fn search_failure_status_is_transport_error() {
        let (base, _req) = serve_once("503 Service Unavailable", Vec::new()).await;
        match client_for(&base).search("x").await {
            Err(Error::Transport(msg)) => assert!(msg.contains("503"), "{msg}"),
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[test]
    fn decodes_search_results() {
        let hits = decode_search(
            r#"{"pages": 3, "result": [
                {"page": 0, "moose": {"name": "Bullwinkle", "image": "..."}},
                {"page": 2, "moose": {"name": "moose 2"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            hits,
            vec![
                SearchHit {
                    name: "Bullwinkle".to_string(),
                    page: 0
                },
                SearchHit {
                    name: "moose 2".to_string(),
                    page: 2
                },
            ]
        );
        assert!(decode_search(r#"{"pages": 0, "result": []}"#)
            .unwrap()
            .is_empty());
        assert!(matches!(decode_search("<html>"), Err(Error::Transport(_))));
    }
}
