//! Lazy record sequence over a `{ "results": [...], "next": <url-or-null> }` API.

use crate::adapters::http::{loggable_url, send_json};
use crate::domain::model::Record;
use crate::utils::error::{EtlError, Result};
use futures::Stream;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use url::Url;

#[derive(Debug, Deserialize)]
struct WirePage {
    results: Vec<Map<String, Value>>,
    /// Absolute or relative URL of the next page; null on the last page.
    #[serde(default)]
    next: Option<String>,
}

/// Yields every record of the current page before fetching the next one.
///
/// Finite and not restartable. After an error the sequence is exhausted.
pub struct Paginator {
    client: reqwest::Client,
    source_name: &'static str,
    next_url: Option<Url>,
    buffer: VecDeque<Record>,
    pages_fetched: u32,
}

impl Paginator {
    pub fn new(client: reqwest::Client, source_name: &'static str, first_page: Url) -> Self {
        Self {
            client,
            source_name,
            next_url: Some(first_page),
            buffer: VecDeque::new(),
            pages_fetched: 0,
        }
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// `Ok(None)` once the server reports no next page and the last batch is drained.
    pub async fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            let Some(url) = self.next_url.take() else {
                return Ok(None);
            };
            self.fetch_page(url).await?;
        }
    }

    async fn fetch_page(&mut self, url: Url) -> Result<()> {
        tracing::debug!(
            "Fetching page {} from {}",
            self.pages_fetched + 1,
            loggable_url(&url)
        );
        let page: WirePage = send_json(self.client.get(url.clone()), self.source_name).await?;
        self.pages_fetched += 1;

        self.next_url = match page.next.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(next) => Some(url.join(next).map_err(|e| {
                EtlError::malformed(
                    self.source_name,
                    format!("invalid next page URL {:?}: {}", next, e),
                )
            })?),
        };
        tracing::debug!(
            "Page {} held {} records, next page: {}",
            self.pages_fetched,
            page.results.len(),
            self.next_url.is_some()
        );
        self.buffer
            .extend(page.results.into_iter().map(Record::from_object));
        Ok(())
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Record>> {
        futures::stream::try_unfold(self, |mut pager| async move {
            Ok::<_, EtlError>(pager.next_record().await?.map(|record| (record, pager)))
        })
    }
}
