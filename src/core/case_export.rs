use crate::adapters::http::auth::ApiToken;
use crate::adapters::http::brasil_io::BrasilIoClient;
use crate::adapters::storage::{float_to_cell, value_to_cell, CsvExporter};
use crate::config::toml_config::EtlConfig;
use crate::core::{ExportReport, Pipeline, Record, Storage};
use crate::domain::filter::AllowList;
use crate::domain::rate::per_100k;
use crate::utils::error::Result;

pub const PIPELINE_NAME: &str = "cases";

/// Identifier matched against each region's allow-list.
pub const IDENTIFIER_FIELD: &str = "city_ibge_code";

pub const DERIVED_RATE_FIELD: &str = "last_available_deaths_per_100k_inhabitants";

pub const CASE_COLUMNS: [&str; 11] = [
    "city",
    "city_ibge_code",
    "date",
    "last_available_confirmed",
    "last_available_confirmed_per_100k_inhabitants",
    DERIVED_RATE_FIELD,
    "estimated_population_2019",
    "last_available_deaths",
    "state",
    "new_confirmed",
    "new_deaths",
];

/// One API query plus the codes kept from its results.
#[derive(Debug, Clone)]
pub struct RegionQuery {
    pub label: String,
    pub filters: Vec<(String, String)>,
    pub allow_list: AllowList,
}

/// A record that passed the allow-list, rendered in [`CASE_COLUMNS`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRow {
    pub cells: Vec<String>,
    /// False when the population was zero or null and the rate cell is empty.
    pub has_rate: bool,
}

impl CaseRow {
    /// Every column but the rate is copied as-is; a missing column is a malformed record.
    pub fn from_record(record: &Record) -> Result<Self> {
        let deaths = record.require_f64("last_available_deaths")?;
        let population = record.require_f64("estimated_population_2019")?;
        let rate = match (deaths, population) {
            (Some(deaths), Some(population)) => per_100k(deaths, population),
            _ => None,
        };

        let mut cells = Vec::with_capacity(CASE_COLUMNS.len());
        for column in CASE_COLUMNS {
            if column == DERIVED_RATE_FIELD {
                cells.push(rate.map(float_to_cell).unwrap_or_default());
            } else {
                cells.push(value_to_cell(record.require(column)?));
            }
        }

        Ok(Self {
            cells,
            has_rate: rate.is_some(),
        })
    }
}

pub struct CaseExportPipeline<S: Storage> {
    storage: S,
    client: BrasilIoClient,
    dataset: String,
    table: String,
    output_file: String,
    regions: Vec<RegionQuery>,
}

impl<S: Storage> CaseExportPipeline<S> {
    pub fn new(
        storage: S,
        client: BrasilIoClient,
        dataset: impl Into<String>,
        table: impl Into<String>,
        output_file: impl Into<String>,
        regions: Vec<RegionQuery>,
    ) -> Self {
        Self {
            storage,
            client,
            dataset: dataset.into(),
            table: table.into(),
            output_file: output_file.into(),
            regions,
        }
    }

    /// Reads the token from the environment first, so a missing credential
    /// fails before any client or file exists.
    pub fn from_config(config: &EtlConfig, storage: S) -> Result<Self> {
        let cases = config.cases()?;
        let token = ApiToken::from_env(&cases.token_env)?;
        let client = BrasilIoClient::new(&cases.base_url, token, config.request_timeout())?;

        let regions = cases
            .regions
            .iter()
            .map(|region| RegionQuery {
                label: region.state.clone(),
                filters: region.query_filters(),
                allow_list: region.allow_list(),
            })
            .collect();

        Ok(Self::new(
            storage,
            client,
            &cases.dataset,
            &cases.table,
            &cases.output_file,
            regions,
        ))
    }

    /// `Ok(None)` for records outside the allow-list.
    pub fn select(region: &RegionQuery, record: &Record) -> Result<Option<CaseRow>> {
        if !region.allow_list.contains(record.require(IDENTIFIER_FIELD)?) {
            return Ok(None);
        }
        CaseRow::from_record(record).map(Some)
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for CaseExportPipeline<S> {
    fn name(&self) -> &str {
        PIPELINE_NAME
    }

    async fn run(&self) -> Result<ExportReport> {
        let mut report = ExportReport::new(PIPELINE_NAME);
        let mut exporter = CsvExporter::create(&self.storage, &self.output_file, &CASE_COLUMNS)?;

        for region in &self.regions {
            tracing::info!(
                "Fetching {}/{} for {} ({} allowed codes)",
                self.dataset,
                self.table,
                region.label,
                region.allow_list.len()
            );
            let filters = region
                .filters
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str()));
            let mut rows = self.client.data(&self.dataset, &self.table, filters)?;
            let mut kept = 0u64;

            while let Some(record) = rows.next_record().await? {
                report.records_scanned += 1;
                let Some(row) = Self::select(region, &record)? else {
                    continue;
                };
                if !row.has_rate {
                    report.rows_without_rate += 1;
                    tracing::warn!(
                        "No population for {} ({}); {} left empty",
                        row.cells[0],
                        row.cells[1],
                        DERIVED_RATE_FIELD
                    );
                }
                exporter.write_row(&row.cells)?;
                kept += 1;
            }

            tracing::info!(
                "{}: kept {} rows from {} pages",
                region.label,
                kept,
                rows.pages_fetched()
            );
        }

        report.rows_written = exporter.rows_written();
        report.output_files.push(exporter.commit(&self.storage)?);
        Ok(report.finish())
    }
}
