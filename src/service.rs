use http::Method;
use std::borrow::Cow;

/// Everything that tells one Query API service apart from another.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub endpoint: Cow<'static, str>,
    pub api_version: &'static str,
    pub signature_version: &'static str,
    pub http_method: Method,
    pub xml_namespace: Option<&'static str>,
}

impl ServiceConfig {
    pub const EC2: ServiceConfig = ServiceConfig {
        endpoint: Cow::Borrowed("https://ec2.amazonaws.com/"),
        api_version: "2007-08-29",
        signature_version: "1",
        http_method: Method::POST,
        xml_namespace: Some("http://ec2.amazonaws.com/doc/2007-08-29/"),
    };

    pub const SQS: ServiceConfig = ServiceConfig {
        endpoint: Cow::Borrowed("https://queue.amazonaws.com/"),
        api_version: "2007-05-01",
        signature_version: "1",
        http_method: Method::POST,
        xml_namespace: Some("http://queue.amazonaws.com/doc/2007-05-01/"),
    };

    pub const SIMPLE_DB: ServiceConfig = ServiceConfig {
        endpoint: Cow::Borrowed("https://sdb.amazonaws.com/"),
        api_version: "2007-11-07",
        signature_version: "1",
        http_method: Method::POST,
        xml_namespace: Some("http://sdb.amazonaws.com/doc/2007-11-07/"),
    };

    /// FPS documents mix prefixed and unprefixed elements, so they are
    /// queried by local name.
    pub const FPS: ServiceConfig = ServiceConfig {
        endpoint: Cow::Borrowed("https://fps.sandbox.amazonaws.com/"),
        api_version: "2007-01-08",
        signature_version: "1",
        http_method: Method::POST,
        xml_namespace: None,
    };

    /// Same service, different endpoint, e.g. a regional or a local one.
    pub fn with_endpoint<S>(mut self, endpoint: S) -> Self
    where
        S: Into<Cow<'static, str>>,
    {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_http_method(mut self, method: Method) -> Self {
        self.http_method = method;
        self
    }
}
