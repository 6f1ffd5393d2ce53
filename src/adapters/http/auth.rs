//! Authenticated request builder.
//!
//! Static informational headers plus one authorization header derived from a
//! secret loaded once at startup. Tokens are assumed valid for the whole run.

use crate::utils::error::{EtlError, Result};
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::time::Duration;

pub const CLIENT_USER_AGENT: &str = concat!("health-etl/", env!("CARGO_PKG_VERSION"));

/// API token read from the environment.
pub struct ApiToken(SecretString);

impl ApiToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Fails when the variable is unset or blank, before any request is built.
    pub fn from_env(variable: &str) -> Result<Self> {
        match std::env::var(variable) {
            Ok(value) if !value.trim().is_empty() => Ok(Self::new(value.trim())),
            _ => Err(EtlError::MissingCredentialError {
                variable: variable.to_string(),
            }),
        }
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken([REDACTED])")
    }
}

pub enum Credentials {
    /// `Authorization: Token <value>`
    Token(ApiToken),
    /// `Authorization: Basic base64(user:password)`
    Basic {
        username: String,
        password: SecretString,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token(token) => f.debug_tuple("Token").field(token).finish(),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn authorization_value(&self) -> Result<HeaderValue> {
        let raw = match self {
            Credentials::Token(ApiToken(token)) => format!("Token {}", token.expose_secret()),
            Credentials::Basic { username, password } => {
                let pair = format!("{}:{}", username, password.expose_secret());
                format!(
                    "Basic {}",
                    base64::engine::general_purpose::STANDARD.encode(pair)
                )
            }
        };
        let mut value = HeaderValue::from_str(&raw).map_err(|_| EtlError::ConfigError {
            message: "credential contains characters not allowed in an HTTP header".to_string(),
        })?;
        value.set_sensitive(true);
        Ok(value)
    }

    pub fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers.insert(AUTHORIZATION, self.authorization_value()?);
        Ok(headers)
    }
}

/// Client with the credential headers installed on every request.
pub fn build_client(credentials: &Credentials, timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().default_headers(credentials.headers()?);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}
