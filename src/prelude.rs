pub use crate::client::{AwsClient, ClientOptions, RestBody};
pub use crate::credentials::{AccessKeyId, AccessKeySecret, Credentials};
pub use crate::ec2::Ec2;
pub use crate::error::{AwsError, ServiceError};
pub use crate::fps::Fps;
pub use crate::query::QueryParameters;
pub use crate::s3::{S3Options, S3};
pub use crate::sdb::SimpleDb;
pub use crate::service::ServiceConfig;
pub use crate::sqs::Sqs;
pub use crate::types::{CreateObjectOptions, ListObjectsOptions};
pub use crate::visibility::VisibilityExtender;
