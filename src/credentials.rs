use crate::error::AwsError;
use std::env;
use std::fmt::{Debug, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKeyId(pub String);

impl AsRef<str> for AccessKeyId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl AccessKeyId {
    pub fn new(access_key_id: String) -> Self {
        Self(access_key_id)
    }
}

/// The secret never shows up in `Debug` output or logs.
#[derive(Clone)]
pub struct AccessKeySecret(String);

impl Debug for AccessKeySecret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessKeySecret(<hidden>)")
    }
}

impl AsRef<str> for AccessKeySecret {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl AccessKeySecret {
    pub fn new(access_key_secret: String) -> Self {
        Self(access_key_secret)
    }
}

/// Immutable AWS credential pair, injected into an `AwsClient` at construction.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: AccessKeyId,
    pub access_key_secret: AccessKeySecret,
}

impl Credentials {
    pub fn new<S>(key: S, secret: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            access_key_id: AccessKeyId(key.into()),
            access_key_secret: AccessKeySecret(secret.into()),
        }
    }

    /// Reads `AWS_ACCESS_KEY` and `AWS_SECRET_KEY`, loading a `.env` file first if one exists.
    pub fn try_from_env() -> Result<Self, AwsError> {
        dotenvy::dotenv().ok();

        let access_key_id = env::var("AWS_ACCESS_KEY")?;
        let access_key_secret = env::var("AWS_SECRET_KEY")?;
        if access_key_id.is_empty() || access_key_secret.is_empty() {
            return Err(AwsError::Credentials(
                "AWS_ACCESS_KEY and AWS_SECRET_KEY must not be empty".to_string(),
            ));
        }

        Ok(Self {
            access_key_id: AccessKeyId(access_key_id),
            access_key_secret: AccessKeySecret(access_key_secret),
        })
    }
}
