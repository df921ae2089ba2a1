use crate::constants::{CHUNK_SIZE, FORM_CONTENT_TYPE, ISO8601, MAX_REDIRECTS, RFC822};
use crate::credentials::Credentials;
use crate::error::{AwsError, ServiceError};
use crate::md5_base64;
use crate::query::QueryParameters;
use crate::service::ServiceConfig;
use crate::signature;
use crate::xml::XmlDocument;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, DATE, EXPECT, HOST, LOCATION};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use time::format_description::well_known::Rfc2822;
use time::{OffsetDateTime, PrimitiveDateTime};
use tokio::io::AsyncReadExt;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// `true` forces every request, redirect targets included, onto `https`,
    /// `false` onto `http`. Explicit ports are kept either way.
    pub secure_http: bool,
    /// Seconds the server clock runs ahead of the local one, see
    /// [`AwsClient::measure_time_offset`].
    pub time_offset: i64,
    /// Unbounded if `None`
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub danger_allow_insecure: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            secure_http: env::var("AWS_SECURE_HTTP")
                .ok()
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(true),
            time_offset: env::var("AWS_TIME_OFFSET")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0),
            request_timeout: None,
            connect_timeout: Duration::from_secs(10),
            danger_allow_insecure: env::var("AWS_DANGER_ALLOW_INSECURE").as_deref() == Ok("true"),
        }
    }
}

/// Body of a REST request.
///
/// A `File` is opened again for every attempt, so a redirected upload sends
/// the whole content again.
#[derive(Debug, Clone)]
pub enum RestBody {
    Bytes(Bytes),
    File(PathBuf),
}

impl From<Bytes> for RestBody {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for RestBody {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<String> for RestBody {
    fn from(value: String) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<&'static str> for RestBody {
    fn from(value: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(value.as_bytes()))
    }
}

impl RestBody {
    pub async fn content_length(&self) -> Result<u64, AwsError> {
        match self {
            RestBody::Bytes(bytes) => Ok(bytes.len() as u64),
            RestBody::File(path) => Ok(tokio::fs::metadata(path).await?.len()),
        }
    }

    /// Base64 MD5 digest, only known upfront for in-memory bodies.
    pub fn content_md5(&self) -> Option<String> {
        match self {
            RestBody::Bytes(bytes) => Some(md5_base64(bytes)),
            RestBody::File(_) => None,
        }
    }

    async fn to_body(&self) -> Result<reqwest::Body, AwsError> {
        match self {
            RestBody::Bytes(bytes) => Ok(reqwest::Body::from(bytes.clone())),
            RestBody::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                let stream = futures_util::stream::unfold(Some(file), |state| async move {
                    let mut file = state?;
                    let mut buf = vec![0u8; CHUNK_SIZE];
                    match file.read(&mut buf).await {
                        Ok(0) => None,
                        Ok(n) => {
                            buf.truncate(n);
                            Some((Ok(Bytes::from(buf)), Some(file)))
                        }
                        Err(err) => Some((Err(err), None)),
                    }
                });
                Ok(reqwest::Body::wrap_stream(stream))
            }
        }
    }
}

/// Signs and dispatches requests for every service binding.
///
/// Holds the immutable credentials and one connection pool. Cloning is cheap
/// and shares the pool.
#[derive(Debug, Clone)]
pub struct AwsClient {
    credentials: Credentials,
    options: ClientOptions,
    http: reqwest::Client,
}

impl AwsClient {
    pub fn new(credentials: Credentials, options: Option<ClientOptions>) -> Result<Self, AwsError> {
        let options = options.unwrap_or_default();

        let mut builder = reqwest::Client::builder()
            .brotli(true)
            .connect_timeout(options.connect_timeout)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(600))
            // 307s are followed by hand, they must keep the original signature
            .redirect(reqwest::redirect::Policy::none());
        #[cfg(feature = "rustls-tls")]
        {
            builder = builder.use_rustls_tls();
        }
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        if options.danger_allow_insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            credentials,
            options,
            http: builder.build()?,
        })
    }

    pub fn try_from_env() -> Result<Self, AwsError> {
        Self::new(Credentials::try_from_env()?, None)
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Local UTC time corrected by the configured clock offset.
    pub fn current_time(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc() + time::Duration::seconds(self.options.time_offset)
    }

    /// Asks the server at `url` for its clock and returns `server - local` in
    /// whole seconds. Feed the result into [`ClientOptions::time_offset`].
    pub async fn measure_time_offset(&self, url: &str) -> Result<i64, AwsError> {
        let res = self.http.get(url).send().await?;
        let local = OffsetDateTime::now_utc();

        let date = res
            .headers()
            .get(DATE)
            .ok_or_else(|| AwsError::MissingElement("Date header".to_string()))?
            .to_str()?;
        let server = parse_http_date(date)?;

        let offset = (server - local).whole_seconds();
        debug!("measured clock offset of {}s against {}", offset, url);
        Ok(offset)
    }

    pub fn generate_signature(&self, string_to_sign: &str) -> Result<String, AwsError> {
        signature::generate_signature(&self.credentials.access_key_secret, string_to_sign)
    }

    /// Merges the mandatory Query API fields with the caller's parameters.
    ///
    /// A `Timestamp` is only added when the caller supplied neither a
    /// `Timestamp` nor an `Expires`. Caller values win over the defaults.
    pub fn build_query_parameters(
        &self,
        api_version: &str,
        signature_version: &str,
        params: QueryParameters,
    ) -> Result<BTreeMap<String, String>, AwsError> {
        let caller = params.expand();

        let mut merged = BTreeMap::new();
        merged.insert("Version".to_string(), api_version.to_string());
        merged.insert(
            "SignatureVersion".to_string(),
            signature_version.to_string(),
        );
        merged.insert(
            "AWSAccessKeyId".to_string(),
            self.credentials.access_key_id.0.clone(),
        );
        if !caller.contains_key("Timestamp") && !caller.contains_key("Expires") {
            merged.insert(
                "Timestamp".to_string(),
                self.current_time().format(ISO8601)?,
            );
        }
        merged.extend(caller);

        Ok(merged)
    }

    /// Injects a `Date` header when missing and returns the signature over the
    /// REST request description.
    pub fn generate_rest_signature(
        &self,
        method: &Method,
        url: &Url,
        headers: &mut HeaderMap,
        service_host: &str,
    ) -> Result<String, AwsError> {
        if !headers.contains_key(DATE) {
            let date = self.current_time().format(RFC822)?;
            headers.insert(DATE, HeaderValue::try_from(date)?);
        }
        let string_to_sign = signature::rest_string_to_sign(method, url, headers, service_host)?;
        debug!("REST string to sign:\n{}", string_to_sign);
        self.generate_signature(&string_to_sign)
    }

    /// Signs `params` and sends them to a Query API endpoint, in the query
    /// string for `GET` and as a form body for `POST`.
    #[tracing::instrument(level = "debug", skip_all, fields(method = %method, host = url.host_str()))]
    pub async fn do_query(
        &self,
        method: &Method,
        mut url: Url,
        mut params: BTreeMap<String, String>,
    ) -> Result<reqwest::Response, AwsError> {
        if *method != Method::GET && *method != Method::POST {
            return Err(AwsError::ProtocolViolation(format!(
                "the Query API only supports GET and POST, not {}",
                method
            )));
        }
        self.force_scheme(&mut url)?;

        let string_to_sign = signature::query_string_to_sign(&params);
        debug!("Query string to sign: {}", string_to_sign);
        let signature = self.generate_signature(&string_to_sign)?;
        params.insert("Signature".to_string(), signature);

        let builder = if *method == Method::GET {
            url.query_pairs_mut().extend_pairs(params.iter());
            self.http.get(url)
        } else {
            let body = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter())
                .finish();
            self.http
                .post(url)
                .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(body)
        };

        let res = builder.send().await?;
        debug!("Query API response status {}", res.status());
        check_status(res).await
    }

    /// Sends a signed REST request, following up to [`MAX_REDIRECTS`]
    /// temporary redirects with the identical signed headers.
    #[tracing::instrument(level = "debug", skip_all, fields(method = %method, url = %url))]
    pub async fn do_rest(
        &self,
        method: Method,
        mut url: Url,
        body: Option<RestBody>,
        mut headers: HeaderMap,
        service_host: &str,
    ) -> Result<reqwest::Response, AwsError> {
        self.force_scheme(&mut url)?;

        let signature = self.generate_rest_signature(&method, &url, &mut headers, service_host)?;
        let authorization =
            signature::authorization_header(self.credentials.access_key_id.as_ref(), &signature);
        headers.insert(AUTHORIZATION, HeaderValue::try_from(authorization)?);

        if method == Method::PUT {
            headers.insert(EXPECT, HeaderValue::from_static("100-continue"));
            if !headers.contains_key(CONTENT_LENGTH) {
                let len = match &body {
                    Some(body) => body.content_length().await?,
                    None => 0,
                };
                headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
            }
        }

        let mut redirects = 0;
        loop {
            headers.insert(HOST, HeaderValue::try_from(signature::host_with_port(&url))?);

            let mut builder = self
                .http
                .request(method.clone(), url.clone())
                .headers(headers.clone());
            if let Some(body) = &body {
                builder = builder.body(body.to_body().await?);
            }

            let res = builder.send().await?;
            debug!("REST response status {} from {}", res.status(), url);
            if res.status() != StatusCode::TEMPORARY_REDIRECT {
                return check_status(res).await;
            }

            let location = res
                .headers()
                .get(LOCATION)
                .ok_or_else(|| AwsError::MissingElement("Location header".to_string()))?
                .to_str()?
                .to_string();
            if redirects >= MAX_REDIRECTS {
                return Err(AwsError::RedirectExhausted {
                    redirects,
                    location,
                });
            }
            redirects += 1;

            url = url.join(&location)?;
            self.force_scheme(&mut url)?;
            debug!("following temporary redirect {} to {}", redirects, url);
        }
    }

    /// Runs a Query API action against the service endpoint and parses the
    /// response document with the service namespace.
    pub async fn query(
        &self,
        service: &ServiceConfig,
        params: QueryParameters,
    ) -> Result<XmlDocument, AwsError> {
        self.query_at(service, &service.endpoint, params).await
    }

    /// Like [`AwsClient::query`] for resources with their own URL, e.g. SQS queues.
    pub async fn query_at(
        &self,
        service: &ServiceConfig,
        url: &str,
        params: QueryParameters,
    ) -> Result<XmlDocument, AwsError> {
        let url = Url::parse(url)?;
        let params =
            self.build_query_parameters(service.api_version, service.signature_version, params)?;
        let res = self.do_query(&service.http_method, url, params).await?;
        let body = res.text().await?;
        XmlDocument::parse(&body, service.xml_namespace)
    }

    fn force_scheme(&self, url: &mut Url) -> Result<(), AwsError> {
        let scheme = if self.options.secure_http {
            "https"
        } else {
            "http"
        };
        if url.scheme() != scheme && url.set_scheme(scheme).is_err() {
            return Err(AwsError::InvalidArgument(format!(
                "cannot switch '{}' to {}",
                url, scheme
            )));
        }
        Ok(())
    }
}

async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, AwsError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let body = res.text().await?;
    let err = ServiceError::from_body(
        status.as_u16(),
        status.canonical_reason().unwrap_or_default(),
        body,
    );
    debug!("service error: {}", err);
    Err(err.into())
}

fn parse_http_date(value: &str) -> Result<OffsetDateTime, AwsError> {
    match PrimitiveDateTime::parse(value, RFC822) {
        Ok(dt) => Ok(dt.assume_utc()),
        Err(_) => Ok(OffsetDateTime::parse(value, &Rfc2822)?),
    }
}
