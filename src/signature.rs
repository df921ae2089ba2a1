use crate::constants::QUEUE_HOST;
use crate::credentials::AccessKeySecret;
use crate::error::AwsError;
use base64::engine::general_purpose;
use base64::Engine;
use hmac::{Hmac, Mac};
use http::header::{CONTENT_TYPE, DATE};
use http::{HeaderMap, Method};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha1::Sha1;
use std::collections::BTreeMap;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

/// Sub-resources that take part in the REST resource path, in check order.
const OVERRIDE_PARAMS: [&str; 4] = ["acl", "torrent", "logging", "location"];

/// Matches python's `urllib.quote`: everything but `A-Za-z0-9_.-/` is escaped.
const QUOTE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'/');

const QUOTE_SLASH: &AsciiSet = &QUOTE.add(b'/');

pub fn uri_encode(string: &str, encode_slash: bool) -> String {
    if encode_slash {
        utf8_percent_encode(string, QUOTE_SLASH).to_string()
    } else {
        utf8_percent_encode(string, QUOTE).to_string()
    }
}

/// Base64 encoded HMAC-SHA1 of `string_to_sign`, keyed with the secret.
pub fn generate_signature(
    secret_key: &AccessKeySecret,
    string_to_sign: &str,
) -> Result<String, AwsError> {
    let mut hmac = HmacSha1::new_from_slice(secret_key.as_ref().as_bytes())?;
    hmac.update(string_to_sign.as_bytes());
    Ok(general_purpose::STANDARD.encode(hmac.finalize().into_bytes()))
}

/// Query API request description: parameter names sorted case-insensitively,
/// each name directly followed by its value, no separators.
pub fn query_string_to_sign(params: &BTreeMap<String, String>) -> String {
    let mut names = params.keys().collect::<Vec<&String>>();
    // the byte order tie-break keeps `Foo` / `foo` pairs deterministic
    names.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });

    let mut desc = String::with_capacity(params.len() * 24);
    for name in names {
        desc.push_str(name);
        desc.push_str(&params[name]);
    }
    desc
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AwsError> {
    match headers.get(name) {
        Some(value) => Ok(value.to_str()?),
        None => Ok(""),
    }
}

fn canonical_amz_headers(headers: &HeaderMap) -> Result<String, AwsError> {
    let mut amz = BTreeMap::new();
    for (key, value) in headers.iter() {
        let key = key.as_str().to_lowercase();
        if key.starts_with("x-amz-") {
            amz.insert(key, value.to_str()?);
        }
    }

    let mut out = String::new();
    for (key, value) in amz {
        out.push_str(&key);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }
    Ok(out)
}

/// `host[:port]` exactly as it appears in the URL authority.
pub(crate) fn host_with_port(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// The resource part of a REST request description.
///
/// Requests against any host but the canonical service host carry the bucket
/// (virtual hosted `<bucket>.<service_host>`) or the whole host name as a
/// path prefix. At most one override parameter is appended: the first of
/// `acl`, `torrent`, `logging`, `location` present as a bare query argument.
pub fn canonical_resource(url: &Url, service_host: &str) -> String {
    let host = host_with_port(url);

    let mut resource = String::new();
    if host != service_host && host != QUEUE_HOST {
        let bucket = host
            .strip_suffix(service_host)
            .and_then(|prefix| prefix.strip_suffix('.'))
            .filter(|bucket| !bucket.is_empty());
        resource.push('/');
        resource.push_str(bucket.unwrap_or(&host));
    }

    resource.push_str(url.path());
    if resource.is_empty() {
        resource.push('/');
    }

    let query = url.query().unwrap_or_default();
    if let Some(param) = OVERRIDE_PARAMS
        .iter()
        .find(|param| query.split('&').any(|arg| arg == **param))
    {
        resource.push('?');
        resource.push_str(param);
    }

    resource
}

/// REST API request description. `Date` must already be present in `headers`.
pub fn rest_string_to_sign(
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
    service_host: &str,
) -> Result<String, AwsError> {
    Ok(format!(
        "{}\n{}\n{}\n{}\n{}{}",
        method.as_str(),
        header_str(headers, "content-md5")?,
        header_str(headers, CONTENT_TYPE.as_str())?,
        header_str(headers, DATE.as_str())?,
        canonical_amz_headers(headers)?,
        canonical_resource(url, service_host),
    ))
}

pub fn authorization_header(access_key: &str, signature: &str) -> String {
    format!("AWS {}:{}", access_key, signature)
}
