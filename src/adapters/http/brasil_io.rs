use crate::adapters::http::auth::{build_client, ApiToken, Credentials};
use crate::adapters::http::base_url;
use crate::adapters::http::paginator::Paginator;
use crate::utils::error::Result;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.brasil.io/v1/";

const SOURCE_NAME: &str = "brasil.io";

/// Client for the Brasil.IO dataset API.
#[derive(Debug, Clone)]
pub struct BrasilIoClient {
    base_url: Url,
    client: reqwest::Client,
}

impl BrasilIoClient {
    pub fn new(base: &str, token: ApiToken, timeout: Option<Duration>) -> Result<Self> {
        Ok(Self {
            base_url: base_url("cases.base_url", base)?,
            client: build_client(&Credentials::Token(token), timeout)?,
        })
    }

    /// `{base}/dataset/{slug}/{table}/data/?<filters>&page=1`
    pub fn data_url<I, K, V>(&self, dataset: &str, table: &str, filters: I) -> Result<Url>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut url = self
            .base_url
            .join(&format!("dataset/{}/{}/data/", dataset, table))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in filters {
                query.append_pair(key.as_ref(), value.as_ref());
            }
            query.append_pair("page", "1");
        }
        Ok(url)
    }

    /// All rows of `dataset/table` matching `filters`, fetched page by page.
    pub fn data<I, K, V>(&self, dataset: &str, table: &str, filters: I) -> Result<Paginator>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let url = self.data_url(dataset, table, filters)?;
        tracing::info!("Querying {}/{} at {}", dataset, table, url.path());
        Ok(Paginator::new(self.client.clone(), SOURCE_NAME, url))
    }
}
