// Copyright 2024 Sebastian Dobe <sebastiandobe@mailbox.org>

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

use base64::engine::general_purpose;
use base64::Engine;

/// Signing dispatcher shared by all service clients
pub use crate::client::{AwsClient, ClientOptions, RestBody};
/// AWS Credentials
pub use crate::credentials::{AccessKeyId, AccessKeySecret, Credentials};
/// Crate wide Error type which wraps errors from different sources
pub use crate::error::{AwsError, ServiceError};
/// Query API parameters and per service settings
pub use crate::query::QueryParameters;
pub use crate::service::ServiceConfig;
/// Owned XML response documents
pub use crate::xml::{XmlDocument, XmlElement, XmlNode};

/// Elastic Compute Cloud
pub use crate::ec2::{
    ConsoleOutput, Ec2, Image, ImageAttribute, ImageAttributeValue, Instance,
    InstanceStateChange, IpPermission, KeyPair, Reservation, RunInstancesOptions, SecurityGroup,
    UserGroup,
};
/// Flexible Payments Service
pub use crate::fps::{
    AccountBalance, Amount, Fps, PaymentRequest, RefundRequest, StatusChange, Token,
    TokenUsageLimit, Transaction, TransactionPart, TransactionResponse, TransactionResult,
    TransactionResults, UsageLimit,
};
/// Simple Storage Service, REST API
pub use crate::s3::{is_valid_dns_name, S3Options, S3};
pub use crate::types::{
    AccessControlPolicy, BucketEntry, CreateObjectOptions, GetObjectResult, Grant, Grantee,
    ListBucketsResult, ListObjectsOptions, ListObjectsResult, LoggingStatus, Object,
    ObjectMetadata, Owner,
};
/// SimpleDB
pub use crate::sdb::SimpleDb;
/// Simple Queue Service
pub use crate::sqs::{Message, QueueGrant, Sqs};
pub use crate::visibility::VisibilityExtender;

mod client;
mod command;
mod constants;
mod credentials;
mod ec2;
mod error;
mod fps;
mod query;
mod s3;
mod sdb;
mod service;
mod signature;
mod sqs;
#[cfg(test)]
mod testing;
mod types;
mod visibility;
mod xml;

pub mod prelude;

/// Low level signing helpers, mostly useful to verify signatures
pub mod signing {
    pub use crate::signature::{
        authorization_header, canonical_resource, generate_signature, query_string_to_sign,
        rest_string_to_sign, uri_encode,
    };
}

fn md5_base64(s: &[u8]) -> String {
    general_purpose::STANDARD.encode(md5::compute(s).as_ref())
}
