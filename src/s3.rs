use crate::client::{AwsClient, RestBody};
use crate::command::Command;
use crate::constants::{S3_ENDPOINT, S3_XML_NAMESPACE};
use crate::error::AwsError;
use crate::signature::{self, uri_encode};
use crate::types::{
    AccessControlPolicy, AccessControlPolicyXml, BucketEntry, BucketLoggingStatus,
    CreateBucketConfiguration, CreateObjectOptions, GetObjectResult, Grant, Grantee,
    ListBucketsResult, ListObjectsOptions, ListObjectsResult, LoggingStatus, Object,
    ObjectMetadata, Owner,
};
use crate::xml::{XmlDocument, XmlNode};
use bytes::Bytes;
use futures_util::StreamExt;
use http::header::{CONTENT_TYPE, DATE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::env;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct S3Options {
    /// `host[:port]` of the service, `s3.amazonaws.com` by default
    pub endpoint_host: String,
    /// Never use `<bucket>.<endpoint_host>` virtual hosts, always put the
    /// bucket into the path.
    pub path_style: bool,
}

impl Default for S3Options {
    fn default() -> Self {
        Self {
            endpoint_host: env::var("AWS_S3_ENDPOINT").unwrap_or_else(|_| S3_ENDPOINT.to_string()),
            path_style: env::var("AWS_S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(false),
        }
    }
}

/// Whether `bucket` can be used as a host name label, which allows virtual
/// hosted requests to `<bucket>.s3.amazonaws.com`.
pub fn is_valid_dns_name(bucket: &str) -> bool {
    if bucket.len() < 3 || bucket.len() > 63 {
        return false;
    }

    let bytes = bucket.as_bytes();
    if !(bytes[0].is_ascii_lowercase() || bytes[0].is_ascii_digit()) {
        return false;
    }
    if !bytes
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'.' || *b == b'-')
    {
        return false;
    }
    // rules out IP addresses
    if !bytes.iter().any(|b| b.is_ascii_lowercase()) {
        return false;
    }

    bucket
        .split('.')
        .all(|fragment| !fragment.is_empty() && !fragment.starts_with('-') && !fragment.ends_with('-'))
}

/// Client for the S3 REST API.
#[derive(Debug, Clone)]
pub struct S3 {
    client: AwsClient,
    options: S3Options,
}

impl S3 {
    pub fn new(client: AwsClient, options: Option<S3Options>) -> Self {
        Self {
            client,
            options: options.unwrap_or_default(),
        }
    }

    pub fn try_from_env() -> Result<Self, AwsError> {
        Ok(Self::new(AwsClient::try_from_env()?, None))
    }

    pub fn client(&self) -> &AwsClient {
        &self.client
    }

    /// Builds the URL of a bucket, an object or the service itself.
    ///
    /// DNS compatible bucket names become part of the host name, all others
    /// go into the path. Parameters without a value are written as bare
    /// names, e.g. `?acl`.
    pub fn generate_s3_url(
        &self,
        bucket: Option<&str>,
        key: Option<&str>,
        params: &[(&str, Option<&str>)],
    ) -> Result<Url, AwsError> {
        let bucket = bucket.unwrap_or_default();
        if let Some(key) = key {
            reject_dot_segments(key)?;
        }
        if bucket == "." || bucket == ".." {
            return Err(AwsError::InvalidArgument(format!(
                "bucket name '{}' would address the service root",
                bucket
            )));
        }
        let virtual_host = !self.options.path_style && is_valid_dns_name(bucket);
        let scheme = if self.client.options().secure_http {
            "https"
        } else {
            "http"
        };

        let mut url = if virtual_host {
            format!("{}://{}.{}", scheme, bucket, self.options.endpoint_host)
        } else {
            format!("{}://{}", scheme, self.options.endpoint_host)
        };
        if !bucket.is_empty() && !virtual_host {
            url.push('/');
            url.push_str(&uri_encode(bucket, false));
        }
        if let Some(key) = key.filter(|k| !k.is_empty()) {
            url.push('/');
            url.push_str(&uri_encode(key, false));
        }

        let query = params
            .iter()
            .map(|(name, value)| match value {
                Some(value) => format!("{}={}", name, uri_encode(value, false)),
                None => name.to_string(),
            })
            .collect::<Vec<String>>()
            .join("&");
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }

        Ok(Url::parse(&url)?)
    }

    pub async fn list_buckets(&self) -> Result<ListBucketsResult, AwsError> {
        let res = self.send_request(Command::ListBuckets, None, None).await?;
        let doc = Self::document(res).await?;

        let buckets = doc
            .list("//Buckets/Bucket")
            .into_iter()
            .map(|node| {
                Ok(BucketEntry {
                    name: node.required("Name")?,
                    creation_date: node.value("CreationDate").unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, AwsError>>()?;

        Ok(ListBucketsResult {
            owner: Owner {
                id: doc.value("//Owner/ID").unwrap_or_default(),
                display_name: doc.value("//Owner/DisplayName"),
            },
            buckets,
        })
    }

    /// Creates a bucket. Any location but `US` is sent as a location constraint.
    pub async fn create_bucket(&self, bucket: &str, location: Option<&str>) -> Result<(), AwsError> {
        let configuration = match location {
            Some(location) if location != "US" => Some(quick_xml::se::to_string(
                &CreateBucketConfiguration::new(location),
            )?),
            _ => None,
        };
        self.send_request(Command::CreateBucket { configuration }, Some(bucket), None)
            .await?;
        Ok(())
    }

    pub async fn delete_bucket(&self, bucket: &str) -> Result<(), AwsError> {
        self.send_request(Command::DeleteBucket, Some(bucket), None)
            .await?;
        Ok(())
    }

    /// `None` for buckets in the default location
    pub async fn get_bucket_location(&self, bucket: &str) -> Result<Option<String>, AwsError> {
        let res = self
            .send_request(Command::GetBucketLocation, Some(bucket), None)
            .await?;
        let doc = Self::document(res).await?;
        Ok(doc.value("//LocationConstraint").filter(|l| !l.is_empty()))
    }

    /// Lists the whole bucket, following truncated listings until the end.
    pub async fn list_objects(
        &self,
        bucket: &str,
        options: ListObjectsOptions,
    ) -> Result<ListObjectsResult, AwsError> {
        let mut result = ListObjectsResult {
            bucket_name: bucket.to_string(),
            ..Default::default()
        };
        let mut marker = options.marker.clone();

        loop {
            let command = Command::ListObjects {
                prefix: options.prefix.as_deref(),
                marker: marker.as_deref(),
                delimiter: options.delimiter.as_deref(),
                max_keys: options.max_keys,
            };
            let res = self.send_request(command, Some(bucket), None).await?;
            let doc = Self::document(res).await?;

            for node in doc.list("//Contents") {
                result.objects.push(object_from(node)?);
            }
            for node in doc.list("//CommonPrefixes/Prefix") {
                result.prefixes.push(node.text().to_string());
            }

            if doc.value("//IsTruncated").as_deref() != Some("true") {
                break;
            }
            // without a NextMarker the listing continues after the last key
            marker = match doc.value("//NextMarker").filter(|m| !m.is_empty()) {
                Some(next) => Some(next),
                None => match doc.list("//Contents/Key").last() {
                    Some(key) => Some(key.text().to_string()),
                    None => {
                        warn!("truncated listing of '{}' without a marker to continue", bucket);
                        break;
                    }
                },
            };
            debug!("listing of '{}' continues after {:?}", bucket, marker);
        }

        Ok(result)
    }

    /// Uploads an object and returns its ETag.
    pub async fn create_object<B>(
        &self,
        bucket: &str,
        key: &str,
        body: B,
        options: CreateObjectOptions,
    ) -> Result<Option<String>, AwsError>
    where
        B: Into<RestBody>,
    {
        let command = Command::PutObject {
            body: body.into(),
            content_type: options
                .content_type
                .as_deref()
                .unwrap_or("application/octet-stream"),
            content_md5: options.content_md5.clone(),
            acl: &options.acl,
            metadata: &options.metadata,
        };
        let res = self.send_request(command, Some(bucket), Some(key)).await?;
        Ok(res
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }

    /// `headers` are passed through to the request, which allows ranged and
    /// conditional GETs.
    pub async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        headers: Option<&HeaderMap>,
    ) -> Result<GetObjectResult, AwsError> {
        let res = self
            .send_request(Command::GetObject { headers }, Some(bucket), Some(key))
            .await?;
        let metadata = ObjectMetadata::from_headers(key, res.headers());
        let body = res.bytes().await?;
        Ok(GetObjectResult { metadata, body })
    }

    /// Streams the object into a new file at `path` instead of memory.
    pub async fn get_object_to_file<P>(
        &self,
        bucket: &str,
        key: &str,
        path: P,
        headers: Option<&HeaderMap>,
    ) -> Result<ObjectMetadata, AwsError>
    where
        P: AsRef<Path>,
    {
        let res = self
            .send_request(Command::GetObject { headers }, Some(bucket), Some(key))
            .await?;
        let metadata = ObjectMetadata::from_headers(key, res.headers());

        let mut file = tokio::fs::File::create(path.as_ref()).await?;
        let mut stream = res.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        Ok(metadata)
    }

    /// HEAD information for an object
    pub async fn get_object_metadata(
        &self,
        bucket: &str,
        key: &str,
        headers: Option<&HeaderMap>,
    ) -> Result<ObjectMetadata, AwsError> {
        let res = self
            .send_request(Command::HeadObject { headers }, Some(bucket), Some(key))
            .await?;
        Ok(ObjectMetadata::from_headers(key, res.headers()))
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), AwsError> {
        self.send_request(Command::DeleteObject, Some(bucket), Some(key))
            .await?;
        Ok(())
    }

    /// `None` if server access logging is disabled for the bucket.
    pub async fn get_logging(&self, bucket: &str) -> Result<Option<LoggingStatus>, AwsError> {
        let res = self
            .send_request(Command::GetLogging, Some(bucket), None)
            .await?;
        let doc = Self::document(res).await?;

        if doc.node("//LoggingEnabled").is_none() {
            return Ok(None);
        }
        Ok(Some(LoggingStatus {
            target_bucket: doc.value("//TargetBucket").unwrap_or_default(),
            target_prefix: doc.value("//TargetPrefix").unwrap_or_default(),
        }))
    }

    /// Enables logging into `target` (bucket, key prefix), or disables it for `None`.
    pub async fn set_logging(
        &self,
        bucket: &str,
        target: Option<(&str, &str)>,
    ) -> Result<(), AwsError> {
        let status = quick_xml::se::to_string(&BucketLoggingStatus::new(target))?;
        self.send_request(Command::PutLogging { status }, Some(bucket), None)
            .await?;
        Ok(())
    }

    /// ACL of a bucket, or of an object when `key` is given.
    pub async fn get_acl(
        &self,
        bucket: &str,
        key: Option<&str>,
    ) -> Result<AccessControlPolicy, AwsError> {
        let res = self.send_request(Command::GetAcl, Some(bucket), key).await?;
        let doc = Self::document(res).await?;

        let grants = doc
            .list("//Grant")
            .into_iter()
            .map(grant_from)
            .collect::<Result<Vec<_>, AwsError>>()?;

        Ok(AccessControlPolicy {
            owner: Owner {
                id: doc.value("//Owner/ID").unwrap_or_default(),
                display_name: doc.value("//Owner/DisplayName"),
            },
            grants,
        })
    }

    /// Replaces the ACL. The owner must be repeated in `grants` to keep access.
    pub async fn set_acl(
        &self,
        bucket: &str,
        key: Option<&str>,
        owner_id: &str,
        grants: &[Grant],
    ) -> Result<(), AwsError> {
        let policy = quick_xml::se::to_string(&AccessControlPolicyXml::new(owner_id, grants))?;
        self.send_request(Command::PutAcl { policy }, Some(bucket), key)
            .await?;
        Ok(())
    }

    pub async fn set_canned_acl(
        &self,
        bucket: &str,
        key: Option<&str>,
        acl: &str,
    ) -> Result<(), AwsError> {
        self.send_request(Command::PutCannedAcl { acl }, Some(bucket), key)
            .await?;
        Ok(())
    }

    pub async fn get_torrent(&self, bucket: &str, key: &str) -> Result<Bytes, AwsError> {
        let res = self
            .send_request(Command::GetTorrent, Some(bucket), Some(key))
            .await?;
        Ok(res.bytes().await?)
    }

    /// Pre-signed URI granting `method` access to an object until `expires`
    /// (unix epoch seconds), without sending any credentials.
    ///
    /// With `virtual_host`, the bucket name is used as the host name, which
    /// suits buckets that are CNAME aliases.
    pub fn get_signed_uri(
        &self,
        method: &Method,
        expires: i64,
        bucket: &str,
        key: &str,
        params: &[(&str, Option<&str>)],
        virtual_host: bool,
    ) -> Result<String, AwsError> {
        let url = self.generate_s3_url(Some(bucket), Some(key), params)?;

        let mut headers = HeaderMap::new();
        headers.insert(DATE, HeaderValue::from(expires));
        let signature = self.client.generate_rest_signature(
            method,
            &url,
            &mut headers,
            &self.options.endpoint_host,
        )?;

        let host = if virtual_host {
            bucket.to_string()
        } else {
            signature::host_with_port(&url)
        };

        let mut uri = format!("{}://{}{}?", url.scheme(), host, url.path());
        if let Some(query) = url.query().filter(|q| !q.is_empty()) {
            uri.push_str(query);
            uri.push('&');
        }
        uri.push_str(&format!(
            "Signature={}&Expires={}&AWSAccessKeyId={}",
            uri_encode(&signature, true),
            expires,
            self.client.credentials().access_key_id.as_ref(),
        ));

        Ok(uri)
    }

    async fn send_request(
        &self,
        command: Command<'_>,
        bucket: Option<&str>,
        key: Option<&str>,
    ) -> Result<reqwest::Response, AwsError> {
        let params = command.query_params();
        let params = params
            .iter()
            .map(|(name, value)| (*name, value.as_deref()))
            .collect::<Vec<_>>();
        let url = self.generate_s3_url(bucket, key, &params)?;
        let headers = Self::build_headers(&command)?;

        self.client
            .do_rest(
                command.http_method(),
                url,
                command.body(),
                headers,
                &self.options.endpoint_host,
            )
            .await
    }

    fn build_headers(command: &Command<'_>) -> Result<HeaderMap, AwsError> {
        let mut headers = HeaderMap::with_capacity(4);

        if let Some(content_type) = command.content_type() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);
        }

        match command {
            Command::PutObject {
                body,
                content_md5,
                acl,
                metadata,
                ..
            } => {
                let md5 = match content_md5 {
                    Some(md5) => Some(md5.clone()),
                    None => match body {
                        RestBody::Bytes(bytes) if bytes.is_empty() => None,
                        body => body.content_md5(),
                    },
                };
                if let Some(md5) = md5 {
                    headers.insert(
                        HeaderName::from_static("content-md5"),
                        HeaderValue::try_from(md5)?,
                    );
                }
                headers.insert(
                    HeaderName::from_static("x-amz-acl"),
                    HeaderValue::from_str(acl)?,
                );
                for (name, value) in metadata.iter() {
                    headers.insert(
                        HeaderName::try_from(format!("x-amz-meta-{}", name.to_lowercase()))?,
                        HeaderValue::from_str(value)?,
                    );
                }
            }
            Command::PutCannedAcl { acl } => {
                headers.insert(
                    HeaderName::from_static("x-amz-acl"),
                    HeaderValue::from_str(acl)?,
                );
            }
            Command::GetObject {
                headers: Some(extra),
            }
            | Command::HeadObject {
                headers: Some(extra),
            } => {
                for (name, value) in extra.iter() {
                    headers.append(name.clone(), value.clone());
                }
            }
            _ => {}
        }

        Ok(headers)
    }

    async fn document(res: reqwest::Response) -> Result<XmlDocument, AwsError> {
        let body = res.text().await?;
        XmlDocument::parse(&body, Some(S3_XML_NAMESPACE))
    }
}

/// URLs normalize `.` and `..` path segments, in any percent encoding, which
/// would send the request to another object.
fn reject_dot_segments(key: &str) -> Result<(), AwsError> {
    if key.split('/').any(|segment| segment == "." || segment == "..") {
        return Err(AwsError::InvalidArgument(format!(
            "object key '{}' contains a '.' or '..' path segment",
            key
        )));
    }
    Ok(())
}

fn object_from(node: XmlNode<'_>) -> Result<Object, AwsError> {
    Ok(Object {
        key: node.required("Key")?,
        size: node
            .value("Size")
            .map(|s| s.parse::<u64>())
            .transpose()?
            .unwrap_or_default(),
        last_modified: node.value("LastModified").unwrap_or_default(),
        etag: node.value("ETag"),
        owner: node.node("Owner").map(|owner| Owner {
            id: owner.value("ID").unwrap_or_default(),
            display_name: owner.value("DisplayName"),
        }),
    })
}

fn grant_from(node: XmlNode<'_>) -> Result<Grant, AwsError> {
    let grantee = node
        .node("Grantee")
        .ok_or_else(|| AwsError::MissingElement("Grantee".to_string()))?;

    let grantee = match grantee.attribute("type") {
        Some("Group") => Grantee::Group(grantee.value("URI").unwrap_or_default()),
        Some("AmazonCustomerByEmail") => {
            Grantee::Email(grantee.value("EmailAddress").unwrap_or_default())
        }
        _ => Grantee::CanonicalUser {
            id: grantee.value("ID").unwrap_or_default(),
            display_name: grantee.value("DisplayName"),
        },
    };

    Ok(Grant {
        grantee,
        permission: node.required("Permission")?,
    })
}
