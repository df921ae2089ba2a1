use crate::constants::{S3_XML_NAMESPACE, XSI_NAMESPACE};
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Owner {
    /// Canonical user id
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEntry {
    pub name: String,
    pub creation_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListBucketsResult {
    pub owner: Owner,
    pub buckets: Vec<BucketEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    /// The object's key
    pub key: String,
    /// Size in bytes of the object.
    pub size: u64,
    /// Date and time the object was last modified.
    pub last_modified: String,
    /// The entity tag is an MD5 hash of the object. The ETag only reflects changes to the
    /// contents of an object, not its metadata.
    pub etag: Option<String>,
    pub owner: Option<Owner>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsResult {
    pub bucket_name: String,
    pub objects: Vec<Object>,
    /// Keys rolled up into a common prefix by the delimiter
    pub prefixes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListObjectsOptions {
    pub prefix: Option<String>,
    pub marker: Option<String>,
    pub delimiter: Option<String>,
    /// Page size, the listing still follows every page.
    pub max_keys: Option<u32>,
}

/// Extra settings for an upload.
#[derive(Debug, Clone)]
pub struct CreateObjectOptions {
    /// `application/octet-stream` if `None`
    pub content_type: Option<String>,
    /// Canned ACL: `private`, `public-read`, `public-read-write` or `authenticated-read`
    pub acl: String,
    /// Sent as `x-amz-meta-<name>` headers
    pub metadata: Vec<(String, String)>,
    /// Base64 MD5 of the content. Computed automatically for in-memory bodies.
    pub content_md5: Option<String>,
}

impl Default for CreateObjectOptions {
    fn default() -> Self {
        Self {
            content_type: None,
            acl: "private".to_string(),
            metadata: Vec::new(),
            content_md5: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub key: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Size of the body in bytes.
    pub size: Option<u64>,
    pub content_type: Option<String>,
    /// User metadata from the `x-amz-meta-*` headers, prefix stripped
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct GetObjectResult {
    pub metadata: ObjectMetadata,
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingStatus {
    pub target_bucket: String,
    pub target_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grantee {
    CanonicalUser {
        id: String,
        display_name: Option<String>,
    },
    Email(String),
    /// Group URI, e.g. `http://acs.amazonaws.com/groups/global/AllUsers`
    Group(String),
}

impl Grantee {
    /// Guesses the grantee kind from a bare identifier: an `@` means an email
    /// address, a `://` a group URI, anything else a canonical user id.
    pub fn from_identifier(identifier: &str) -> Self {
        if identifier.contains('@') {
            Self::Email(identifier.to_string())
        } else if identifier.contains("://") {
            Self::Group(identifier.to_string())
        } else {
            Self::CanonicalUser {
                id: identifier.to_string(),
                display_name: None,
            }
        }
    }

    fn xsi_type(&self) -> &'static str {
        match self {
            Grantee::CanonicalUser { .. } => "CanonicalUser",
            Grantee::Email(_) => "AmazonCustomerByEmail",
            Grantee::Group(_) => "Group",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub grantee: Grantee,
    /// `READ`, `WRITE`, `READ_ACP`, `WRITE_ACP` or `FULL_CONTROL`
    pub permission: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControlPolicy {
    pub owner: Owner,
    pub grants: Vec<Grant>,
}

pub(crate) trait GetAndConvertHeaders {
    fn get_and_convert<T: FromStr>(&self, header: &str) -> Option<T>;
    fn get_string(&self, header: &str) -> Option<String>;
}

impl GetAndConvertHeaders for http::header::HeaderMap {
    fn get_and_convert<T: FromStr>(&self, header: &str) -> Option<T> {
        self.get(header)?.to_str().ok()?.parse::<T>().ok()
    }
    fn get_string(&self, header: &str) -> Option<String> {
        Some(self.get(header)?.to_str().ok()?.to_owned())
    }
}

impl ObjectMetadata {
    pub(crate) fn from_headers(key: &str, headers: &http::HeaderMap) -> Self {
        let mut metadata = HashMap::new();
        for (name, value) in headers.iter() {
            if let Some(meta) = name.as_str().strip_prefix("x-amz-meta-") {
                if let Ok(value) = value.to_str() {
                    metadata.insert(meta.to_owned(), value.to_owned());
                }
            }
        }

        Self {
            key: key.to_string(),
            etag: headers.get_string("ETag"),
            last_modified: headers.get_string("Last-Modified"),
            size: headers.get_and_convert("Content-Length"),
            content_type: headers.get_string("Content-Type"),
            metadata,
        }
    }
}

// request documents

#[derive(Debug, Serialize)]
#[serde(rename = "CreateBucketConfiguration")]
pub(crate) struct CreateBucketConfiguration<'a> {
    #[serde(rename = "@xmlns")]
    xmlns: &'a str,
    #[serde(rename = "LocationConstraint")]
    location_constraint: &'a str,
}

impl<'a> CreateBucketConfiguration<'a> {
    pub fn new(location: &'a str) -> Self {
        Self {
            xmlns: S3_XML_NAMESPACE,
            location_constraint: location,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename = "BucketLoggingStatus")]
pub(crate) struct BucketLoggingStatus<'a> {
    #[serde(rename = "@xmlns")]
    xmlns: &'a str,
    #[serde(rename = "LoggingEnabled", skip_serializing_if = "Option::is_none")]
    logging_enabled: Option<LoggingEnabled<'a>>,
}

#[derive(Debug, Serialize)]
struct LoggingEnabled<'a> {
    #[serde(rename = "TargetBucket")]
    target_bucket: &'a str,
    #[serde(rename = "TargetPrefix")]
    target_prefix: &'a str,
}

impl<'a> BucketLoggingStatus<'a> {
    pub fn new(target: Option<(&'a str, &'a str)>) -> Self {
        Self {
            xmlns: S3_XML_NAMESPACE,
            logging_enabled: target.map(|(target_bucket, target_prefix)| LoggingEnabled {
                target_bucket,
                target_prefix,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename = "AccessControlPolicy")]
pub(crate) struct AccessControlPolicyXml<'a> {
    #[serde(rename = "@xmlns")]
    xmlns: &'a str,
    #[serde(rename = "Owner")]
    owner: OwnerXml<'a>,
    #[serde(rename = "AccessControlList")]
    access_control_list: AccessControlListXml<'a>,
}

#[derive(Debug, Serialize)]
struct OwnerXml<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct AccessControlListXml<'a> {
    #[serde(rename = "Grant")]
    grants: Vec<GrantXml<'a>>,
}

#[derive(Debug, Serialize)]
struct GrantXml<'a> {
    #[serde(rename = "Grantee")]
    grantee: GranteeXml<'a>,
    #[serde(rename = "Permission")]
    permission: &'a str,
}

#[derive(Debug, Serialize)]
struct GranteeXml<'a> {
    #[serde(rename = "@xmlns:xsi")]
    xmlns_xsi: &'a str,
    #[serde(rename = "@xsi:type")]
    xsi_type: &'a str,
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(rename = "EmailAddress", skip_serializing_if = "Option::is_none")]
    email_address: Option<&'a str>,
    #[serde(rename = "URI", skip_serializing_if = "Option::is_none")]
    uri: Option<&'a str>,
}

impl<'a> AccessControlPolicyXml<'a> {
    pub fn new(owner_id: &'a str, grants: &'a [Grant]) -> Self {
        let grants = grants
            .iter()
            .map(|grant| {
                let (id, email_address, uri) = match &grant.grantee {
                    Grantee::CanonicalUser { id, .. } => (Some(id.as_str()), None, None),
                    Grantee::Email(email) => (None, Some(email.as_str()), None),
                    Grantee::Group(uri) => (None, None, Some(uri.as_str())),
                };
                GrantXml {
                    grantee: GranteeXml {
                        xmlns_xsi: XSI_NAMESPACE,
                        xsi_type: grant.grantee.xsi_type(),
                        id,
                        email_address,
                        uri,
                    },
                    permission: grant.permission.as_str(),
                }
            })
            .collect();

        Self {
            xmlns: S3_XML_NAMESPACE,
            owner: OwnerXml { id: owner_id },
            access_control_list: AccessControlListXml { grants },
        }
    }
}
