/// `YYYY-MM-DDThh:mm:ssZ`, used for Query API timestamps
pub const ISO8601: &[time::format_description::BorrowedFormatItem<'static>] =
    time::macros::format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

/// `Www, DD Mon YYYY hh:mm:ss GMT`, used for the REST `Date` header
pub const RFC822: &[time::format_description::BorrowedFormatItem<'static>] = time::macros::format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Read size for streamed REST uploads
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Upper bound of followed 307 Temporary Redirects for a single REST call
pub const MAX_REDIRECTS: usize = 5;

pub const S3_ENDPOINT: &str = "s3.amazonaws.com";
pub const S3_XML_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";
pub const QUEUE_HOST: &str = "queue.amazonaws.com";

pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
