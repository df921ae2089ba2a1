use crate::client::RestBody;
use http::{HeaderMap, Method};

#[derive(Debug)]
pub(crate) enum Command<'a> {
    ListBuckets,
    CreateBucket {
        configuration: Option<String>,
    },
    DeleteBucket,
    GetBucketLocation,
    ListObjects {
        prefix: Option<&'a str>,
        marker: Option<&'a str>,
        delimiter: Option<&'a str>,
        max_keys: Option<u32>,
    },
    PutObject {
        body: RestBody,
        content_type: &'a str,
        content_md5: Option<String>,
        acl: &'a str,
        metadata: &'a [(String, String)],
    },
    /// `headers` are sent as is, e.g. `Range` or `If-None-Match`.
    GetObject {
        headers: Option<&'a HeaderMap>,
    },
    HeadObject {
        headers: Option<&'a HeaderMap>,
    },
    DeleteObject,
    GetLogging,
    PutLogging {
        status: String,
    },
    GetAcl,
    PutAcl {
        policy: String,
    },
    PutCannedAcl {
        acl: &'a str,
    },
    GetTorrent,
}

impl<'a> Command<'a> {
    pub(crate) fn http_method(&self) -> Method {
        match *self {
            Command::ListBuckets
            | Command::GetBucketLocation
            | Command::ListObjects { .. }
            | Command::GetObject { .. }
            | Command::GetLogging
            | Command::GetAcl
            | Command::GetTorrent => Method::GET,
            Command::CreateBucket { .. }
            | Command::PutObject { .. }
            | Command::PutLogging { .. }
            | Command::PutAcl { .. }
            | Command::PutCannedAcl { .. } => Method::PUT,
            Command::DeleteBucket | Command::DeleteObject => Method::DELETE,
            Command::HeadObject { .. } => Method::HEAD,
        }
    }

    /// Query arguments, `None` values are written as bare names.
    pub(crate) fn query_params(&self) -> Vec<(&'static str, Option<String>)> {
        match self {
            Command::GetBucketLocation => vec![("location", None)],
            Command::GetLogging | Command::PutLogging { .. } => vec![("logging", None)],
            Command::GetAcl | Command::PutAcl { .. } | Command::PutCannedAcl { .. } => {
                vec![("acl", None)]
            }
            Command::GetTorrent => vec![("torrent", None)],
            Command::ListObjects {
                prefix,
                marker,
                delimiter,
                max_keys,
            } => {
                let mut params = Vec::with_capacity(4);
                if let Some(prefix) = prefix {
                    params.push(("prefix", Some(prefix.to_string())));
                }
                if let Some(marker) = marker {
                    params.push(("marker", Some(marker.to_string())));
                }
                if let Some(delimiter) = delimiter {
                    params.push(("delimiter", Some(delimiter.to_string())));
                }
                if let Some(max_keys) = max_keys {
                    params.push(("max-keys", Some(max_keys.to_string())));
                }
                params
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn content_type(&self) -> Option<&str> {
        match self {
            Command::PutObject { content_type, .. } => Some(*content_type),
            Command::CreateBucket {
                configuration: Some(_),
            }
            | Command::PutLogging { .. }
            | Command::PutAcl { .. } => Some("application/xml"),
            _ => None,
        }
    }

    pub(crate) fn body(&self) -> Option<RestBody> {
        match self {
            Command::CreateBucket { configuration } => {
                configuration.as_ref().map(|c| RestBody::from(c.clone()))
            }
            Command::PutObject { body, .. } => Some(body.clone()),
            Command::PutLogging { status } => Some(RestBody::from(status.clone())),
            Command::PutAcl { policy } => Some(RestBody::from(policy.clone())),
            _ => None,
        }
    }
}
