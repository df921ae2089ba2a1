use crate::xml::XmlDocument;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("base64 decode: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("credentials: {0}")]
    Credentials(String),
    #[error("env var missing: {0}")]
    EnvVarMissing(#[from] std::env::VarError),
    #[error("from utf8: {0}")]
    FromUtf8(#[from] std::string::FromUtf8Error),
    #[error("header to string: {0}")]
    HeaderToStr(#[from] http::header::ToStrError),
    #[error("hmac invalid length: {0}")]
    HmacInvalidLength(#[from] sha1::digest::InvalidLength),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("tokio task join: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("missing element '{0}' in response document")]
    MissingElement(String),
    #[error("parse int: {0}")]
    ParseInt(#[from] std::num::ParseIntError),
    #[error("parse float: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),
    /// A caller broke the dispatcher contract, e.g. an unsupported HTTP method.
    /// Always raised before any network I/O.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("gave up after {redirects} temporary redirects, last location '{location}'")]
    RedirectExhausted { redirects: usize, location: String },
    #[error("serde xml: {0}")]
    SerdeXml(#[from] quick_xml::SeError),
    #[error("{0}")]
    Service(ServiceError),
    #[error("time format error: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error("time parse error: {0}")]
    TimeParse(#[from] time::error::Parse),
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("url parse: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("xml: {0}")]
    Xml(String),
}

impl AwsError {
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Self::Service(err) => Some(err),
            _ => None,
        }
    }

    /// Only a service explicitly flagging the failure as retriable counts.
    pub fn is_retriable(&self) -> bool {
        self.service_error().map(|e| e.retriable).unwrap_or(false)
    }
}

impl From<ServiceError> for AwsError {
    fn from(value: ServiceError) -> Self {
        Self::Service(value)
    }
}

/// Error reported by a remote service: a non-2xx HTTP status, optionally
/// enriched with the code and message of an XML error document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub status: u16,
    pub reason: String,
    pub code: Option<String>,
    pub message: Option<String>,
    pub error_type: Option<String>,
    pub retriable: bool,
    pub request_id: Option<String>,
    pub body: String,
}

impl ServiceError {
    pub fn new<S: Into<String>>(status: u16, reason: S) -> Self {
        Self {
            status,
            reason: reason.into(),
            code: None,
            message: None,
            error_type: None,
            retriable: false,
            request_id: None,
            body: String::new(),
        }
    }

    /// Classifies an error response body. The known error schemas are
    /// `//Code` + `//Message` (S3, SQS, EC2, SimpleDB) and
    /// `//Errors/Errors` with `ErrorCode`, `ReasonText`, `ErrorType` and
    /// `IsRetriable` (FPS). A body that is not XML leaves the details empty.
    pub fn from_body(status: u16, reason: &str, body: String) -> Self {
        let mut err = Self::new(status, reason);

        if body.trim_start().starts_with('<') {
            match XmlDocument::parse(&body, None) {
                Ok(doc) => err.apply_error_document(&doc),
                Err(e) => tracing::debug!("error body is not valid XML: {}", e),
            }
        }

        err.body = body;
        err
    }

    pub(crate) fn apply_error_document(&mut self, doc: &XmlDocument) {
        if let Some(fps) = doc.node("//Errors/Errors") {
            self.code = fps.value("ErrorCode");
            self.message = fps.value("ReasonText");
            self.error_type = fps.value("ErrorType");
            self.retriable = fps.value("IsRetriable").as_deref() == Some("true");
        } else {
            self.code = doc.value("//Code");
            self.message = doc.value("//Message");
            self.error_type = doc.value("//Type");
        }
        self.request_id = doc.value("//RequestId").or_else(|| doc.value("//RequestID"));
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP Error: {} - {}", self.status, self.reason)?;
        if self.code.is_some() || self.message.is_some() {
            write!(
                f,
                ", AWS Error: {} - {}",
                self.code.as_deref().unwrap_or_default(),
                self.message.as_deref().unwrap_or_default()
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for ServiceError {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_s3_access_denied() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>AccessDenied</Code><Message>Access Denied</Message><RequestId>4442587FB7D0A2F9</RequestId></Error>"#;
        let err = ServiceError::from_body(403, "Forbidden", body.to_string());
        assert_eq!(err.status, 403);
        assert_eq!(err.code.as_deref(), Some("AccessDenied"));
        assert_eq!(err.message.as_deref(), Some("Access Denied"));
        assert_eq!(err.request_id.as_deref(), Some("4442587FB7D0A2F9"));
        assert!(!err.retriable);
        assert_eq!(
            err.to_string(),
            "HTTP Error: 403 - Forbidden, AWS Error: AccessDenied - Access Denied"
        );
    }

    #[test]
    fn test_sqs_namespaced_error() {
        let body = r#"<ErrorResponse xmlns="http://queue.amazonaws.com/doc/2007-05-01/">
  <Error>
    <Type>Sender</Type>
    <Code>AWS.SimpleQueueService.NonExistentQueue</Code>
    <Message>The specified queue does not exist.</Message>
  </Error>
  <RequestID>b5bf2332-e983-4d3e-941a-f64c0d21f00f</RequestID>
</ErrorResponse>"#;
        let err = ServiceError::from_body(400, "Bad Request", body.to_string());
        assert_eq!(
            err.code.as_deref(),
            Some("AWS.SimpleQueueService.NonExistentQueue")
        );
        assert_eq!(err.error_type.as_deref(), Some("Sender"));
        assert_eq!(
            err.request_id.as_deref(),
            Some("b5bf2332-e983-4d3e-941a-f64c0d21f00f")
        );
    }

    #[test]
    fn test_fps_retriable_error() {
        let body = r#"<ns3:PayResponse xmlns:ns3="http://fps.amazonaws.com/doc/2007-01-08/">
  <Status>Failure</Status>
  <Errors><Errors>
    <ErrorType>Business</ErrorType>
    <IsRetriable>true</IsRetriable>
    <ErrorCode>TemporaryFailure</ErrorCode>
    <ReasonText>Try again later</ReasonText>
  </Errors></Errors>
</ns3:PayResponse>"#;
        let err = ServiceError::from_body(200, "OK", body.to_string());
        assert_eq!(err.code.as_deref(), Some("TemporaryFailure"));
        assert_eq!(err.message.as_deref(), Some("Try again later"));
        assert_eq!(err.error_type.as_deref(), Some("Business"));
        assert!(err.retriable);
        assert!(AwsError::from(err).is_retriable());
    }

    #[test]
    fn test_non_xml_body() {
        let err = ServiceError::from_body(503, "Service Unavailable", "busy".to_string());
        assert_eq!(err.code, None);
        assert_eq!(err.body, "busy");
        assert_eq!(err.to_string(), "HTTP Error: 503 - Service Unavailable");
    }
}
