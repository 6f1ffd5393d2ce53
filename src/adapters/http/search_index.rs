//! Elasticsearch-compatible search index, read with the scroll contract.

use crate::adapters::http::auth::{build_client, Credentials};
use crate::adapters::http::{base_url, loggable_url, send_json};
use crate::domain::model::Record;
use crate::utils::error::{EtlError, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://imunizacao-es.saude.gov.br/";

const SOURCE_NAME: &str = "search index";

/// Conjunction of `match_phrase` clauses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhraseQuery {
    clauses: Vec<(String, String)>,
}

impl PhraseQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn match_phrase(mut self, field: impl Into<String>, phrase: impl Into<String>) -> Self {
        self.clauses.push((field.into(), phrase.into()));
        self
    }

    pub fn to_json(&self) -> Value {
        let must: Vec<Value> = self
            .clauses
            .iter()
            .map(|(field, phrase)| {
                let mut clause = Map::new();
                clause.insert(field.clone(), Value::String(phrase.clone()));
                json!({ "match_phrase": clause })
            })
            .collect();
        json!({ "bool": { "must": must } })
    }
}

#[derive(Debug, Deserialize)]
struct WireCount {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct WireSearch {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: WireHits,
}

#[derive(Debug, Deserialize)]
struct WireHits {
    hits: Vec<WireHit>,
}

#[derive(Debug, Deserialize)]
struct WireHit {
    #[serde(rename = "_source")]
    source: Option<Map<String, Value>>,
}

#[derive(Debug, Clone)]
pub struct SearchIndexClient {
    base_url: Url,
    client: reqwest::Client,
    page_size: usize,
    keep_alive: String,
}

impl SearchIndexClient {
    pub fn new(
        base: &str,
        credentials: &Credentials,
        page_size: usize,
        keep_alive: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        Ok(Self {
            base_url: base_url("vaccinations.base_url", base)?,
            client: build_client(credentials, timeout)?,
            page_size,
            keep_alive: keep_alive.into(),
        })
    }

    /// Number of documents matching `query`.
    pub async fn count(&self, query: &PhraseQuery) -> Result<u64> {
        let url = self.base_url.join("_count")?;
        let body = json!({ "query": query.to_json() });
        let count: WireCount =
            send_json(self.client.post(url).json(&body), SOURCE_NAME).await?;
        Ok(count.count)
    }

    /// Every matching document's `_source`, in scroll order.
    pub fn scan(&self, query: &PhraseQuery) -> ScrollScan {
        ScrollScan {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            keep_alive: self.keep_alive.clone(),
            state: ScanState::Start(json!({
                "size": self.page_size,
                "query": query.to_json(),
                "sort": ["_doc"],
            })),
            buffer: VecDeque::new(),
            scroll_id: None,
            pages_fetched: 0,
        }
    }
}

enum ScanState {
    Start(Value),
    Scrolling,
    Done,
}

/// Lazy scroll over search hits. The server-side scroll is cleared when the
/// last page has been read.
pub struct ScrollScan {
    client: reqwest::Client,
    base_url: Url,
    keep_alive: String,
    state: ScanState,
    buffer: VecDeque<Record>,
    scroll_id: Option<String>,
    pages_fetched: u32,
}

impl ScrollScan {
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub async fn next_hit(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            match std::mem::replace(&mut self.state, ScanState::Done) {
                ScanState::Done => return Ok(None),
                ScanState::Start(body) => {
                    let mut url = self.base_url.join("_search")?;
                    url.query_pairs_mut().append_pair("scroll", &self.keep_alive);
                    self.fetch(url, body).await?;
                }
                ScanState::Scrolling => {
                    let Some(scroll_id) = self.scroll_id.clone() else {
                        return Err(EtlError::malformed(
                            SOURCE_NAME,
                            "scroll response did not include _scroll_id",
                        ));
                    };
                    let url = self.base_url.join("_search/scroll")?;
                    let body = json!({ "scroll": self.keep_alive, "scroll_id": scroll_id });
                    self.fetch(url, body).await?;
                }
            }
        }
    }

    async fn fetch(&mut self, url: Url, body: Value) -> Result<()> {
        tracing::debug!(
            "Scroll page {} from {}",
            self.pages_fetched + 1,
            loggable_url(&url)
        );
        let page: WireSearch = send_json(self.client.post(url).json(&body), SOURCE_NAME).await?;
        self.pages_fetched += 1;
        if page.scroll_id.is_some() {
            self.scroll_id = page.scroll_id;
        }

        if page.hits.hits.is_empty() {
            self.clear().await;
            return Ok(());
        }

        for hit in page.hits.hits {
            let source = hit
                .source
                .ok_or_else(|| EtlError::malformed(SOURCE_NAME, "hit without _source"))?;
            self.buffer.push_back(Record::from_object(source));
        }
        self.state = ScanState::Scrolling;
        Ok(())
    }

    /// Releases the scroll context. Best effort: failures are only logged.
    async fn clear(&mut self) {
        let Some(scroll_id) = self.scroll_id.take() else {
            return;
        };
        let url = match self.base_url.join("_search/scroll") {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Could not build clear-scroll URL: {}", e);
                return;
            }
        };
        let result = self
            .client
            .delete(url)
            .json(&json!({ "scroll_id": [scroll_id] }))
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Cleared scroll context");
            }
            Ok(response) => tracing::warn!("Clearing scroll returned {}", response.status()),
            Err(e) => tracing::warn!("Clearing scroll failed: {}", e),
        }
    }
}
