//! Scripted HTTP server for exercising the dispatchers without AWS.

use crate::client::{AwsClient, ClientOptions};
use crate::credentials::Credentials;
use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::{HeaderValue, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub(crate) const TEST_KEY: &str = "AKIDEXAMPLE";
pub(crate) const TEST_SECRET: &str = "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY";

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    async fn record(req: Request<Incoming>) -> Result<Self, hyper::Error> {
        let (parts, body) = req.into_parts();
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let headers = parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        // de-chunks streamed bodies as well
        let body = body.collect().await?.to_bytes().to_vec();

        Ok(Self {
            method: parts.method.to_string(),
            target,
            headers,
            body,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, q)| q)
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn query_params(&self) -> BTreeMap<String, String> {
        url::form_urlencoded::parse(self.query().unwrap_or_default().as_bytes())
            .into_owned()
            .collect()
    }

    pub fn form_params(&self) -> BTreeMap<String, String> {
        url::form_urlencoded::parse(&self.body)
            .into_owned()
            .collect()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn ok<B: Into<Vec<u8>>>(body: B) -> Self {
        Self::status(200, body)
    }

    pub fn status<B: Into<Vec<u8>>>(status: u16, body: B) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self::status(307, "").with_header("Location", location)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn into_response(self) -> Response<Full<Bytes>> {
        let mut builder = Response::builder()
            .status(StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR));
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        // HEAD answers carry the length of the body they leave out
        let len = self.body.len();
        let mut res = builder.body(Full::new(Bytes::from(self.body))).unwrap();
        res.headers_mut()
            .entry(CONTENT_LENGTH)
            .or_insert_with(|| HeaderValue::from(len));
        res
    }
}

type Handler = dyn Fn(&RecordedRequest, usize) -> MockResponse + Send + Sync;

pub(crate) struct MockServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl MockServer {
    /// Answers every request with `handler(request, index)`, `index` counting from 0.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest, usize) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let recorded = requests.clone();
        let handle = tokio::spawn(async move {
            let http = HttpConnBuilder::new(TokioExecutor::new());
            while let Ok((stream, _)) = listener.accept().await {
                let recorded = recorded.clone();
                let handler = handler.clone();
                let svc = service_fn(move |req: Request<Incoming>| {
                    let recorded = recorded.clone();
                    let handler = handler.clone();
                    async move { respond(req, recorded, handler).await }
                });

                let conn = http.serve_connection(TokioIo::new(stream), svc).into_owned();
                tokio::spawn(async move {
                    let _ = conn.await;
                });
            }
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    /// Always answers with the same response.
    pub async fn respond_with(response: MockResponse) -> Self {
        Self::start(move |_, _| response.clone()).await
    }

    /// `host:port` of the listener
    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn respond(
    req: Request<Incoming>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
    handler: Arc<Handler>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let request = match RecordedRequest::record(req).await {
        Ok(request) => request,
        Err(_) => return Ok(MockResponse::status(400, "unreadable body").into_response()),
    };

    let index = {
        let mut guard = recorded.lock();
        guard.push(request.clone());
        guard.len() - 1
    };
    Ok(handler(&request, index).into_response())
}

pub(crate) fn test_options() -> ClientOptions {
    ClientOptions {
        secure_http: false,
        time_offset: 0,
        request_timeout: Some(Duration::from_secs(10)),
        connect_timeout: Duration::from_secs(5),
        danger_allow_insecure: false,
    }
}

pub(crate) fn test_client() -> AwsClient {
    AwsClient::new(
        Credentials::new(TEST_KEY, TEST_SECRET),
        Some(test_options()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_records_chunked_body() {
        let server = MockServer::respond_with(MockResponse::ok("stored")).await;

        let chunks = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"first ")),
            Ok(Bytes::from_static(b"second")),
        ]);
        let res = reqwest::Client::new()
            .put(server.url("/bucket/key?acl"))
            .body(reqwest::Body::wrap_stream(chunks))
            .send()
            .await
            .unwrap();
        assert_eq!(res.text().await.unwrap(), "stored");

        let request = &server.requests()[0];
        assert_eq!(request.method, "PUT");
        assert_eq!(request.header("transfer-encoding"), Some("chunked"));
        assert_eq!(request.body_str(), "first second");
        assert_eq!(request.path(), "/bucket/key");
        assert_eq!(request.query(), Some("acl"));
    }

    #[tokio::test]
    async fn test_head_keeps_content_length() {
        let server = MockServer::respond_with(MockResponse::ok("hello")).await;

        let res = reqwest::Client::new()
            .head(server.url("/"))
            .send()
            .await
            .unwrap();
        assert_eq!(
            res.headers().get(CONTENT_LENGTH).unwrap().to_str().unwrap(),
            "5"
        );
        assert_eq!(server.request_count(), 1);
    }
}
