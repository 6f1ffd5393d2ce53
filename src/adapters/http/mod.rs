//! HTTP clients for the two upstream APIs.
//!
//! Both clients share one response policy: a non-success status or a body
//! that does not match the expected shape is a fatal error for the run.

pub mod auth;
pub mod brasil_io;
pub mod paginator;
pub mod search_index;

use crate::utils::error::{EtlError, Result};
use serde::de::DeserializeOwned;
use url::Url;

/// Longest slice of an error body kept in [`EtlError::HttpStatusError`].
const ERROR_BODY_LIMIT: usize = 512;

/// Sends the request and decodes a JSON body of type `T`.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    source_name: &str,
) -> Result<T> {
    let response = request.send().await?;
    let status = response.status();
    let url = loggable_url(response.url());
    tracing::debug!("{} responded {} for {}", source_name, status, url);

    let body = response.text().await?;
    if !status.is_success() {
        return Err(EtlError::HttpStatusError {
            url,
            status: status.as_u16(),
            body: truncate(&body, ERROR_BODY_LIMIT),
        });
    }

    serde_json::from_str(&body).map_err(|e| {
        EtlError::malformed(source_name, format!("unexpected body from {}: {}", url, e))
    })
}

/// URL without userinfo or fragment, safe for logs and error messages.
pub(crate) fn loggable_url(url: &Url) -> String {
    let mut clean = url.clone();
    let _ = clean.set_username("");
    let _ = clean.set_password(None);
    clean.set_fragment(None);
    clean.to_string()
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Parses `base` and makes sure it ends with `/`, so relative joins keep its path.
pub(crate) fn base_url(field: &str, base: &str) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|e| EtlError::InvalidConfigValueError {
        field: field.to_string(),
        value: base.to_string(),
        reason: e.to_string(),
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
