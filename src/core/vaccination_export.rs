use crate::adapters::http::search_index::{PhraseQuery, SearchIndexClient};
use crate::adapters::storage::{value_to_cell, CsvExporter};
use crate::config::toml_config::{EtlConfig, LocationConfig};
use crate::core::{ExportReport, Pipeline, Record, Storage};
use crate::utils::error::{EtlError, Result};
use crate::utils::progress::create_progress_bar;
use serde_json::Value;

pub const PIPELINE_NAME: &str = "vaccinations";

pub const MUNICIPALITY_FIELD: &str = "paciente_endereco_nmMunicipio";
pub const STATE_FIELD: &str = "paciente_endereco_uf";

pub const VACCINATION_COLUMNS: [&str; 6] = [
    MUNICIPALITY_FIELD,
    STATE_FIELD,
    "vacina_descricao_dose",
    "vacina_dataAplicacao",
    "paciente_idade",
    "paciente_dataNascimento",
];

pub fn location_query(location: &LocationConfig) -> PhraseQuery {
    PhraseQuery::new()
        .match_phrase(MUNICIPALITY_FIELD, &location.municipality)
        .match_phrase(STATE_FIELD, &location.state)
}

/// Documents are sparse; absent fields become empty cells.
pub fn vaccination_row(document: &Record) -> Vec<String> {
    VACCINATION_COLUMNS
        .iter()
        .map(|field| value_to_cell(document.get(field).unwrap_or(&Value::Null)))
        .collect()
}

pub struct VaccinationExportPipeline<S: Storage> {
    storage: S,
    client: SearchIndexClient,
    locations: Vec<LocationConfig>,
    show_progress: bool,
}

impl<S: Storage> VaccinationExportPipeline<S> {
    pub fn new(
        storage: S,
        client: SearchIndexClient,
        locations: Vec<LocationConfig>,
        show_progress: bool,
    ) -> Self {
        Self {
            storage,
            client,
            locations,
            show_progress,
        }
    }

    /// An empty `only` exports every configured location.
    pub fn from_config(
        config: &EtlConfig,
        storage: S,
        only: &[String],
        show_progress: bool,
    ) -> Result<Self> {
        let vaccinations = config.vaccinations()?;
        let credentials = vaccinations.credentials()?;

        let locations = if only.is_empty() {
            vaccinations.locations.clone()
        } else {
            only.iter()
                .map(|label| {
                    vaccinations
                        .locations
                        .iter()
                        .find(|l| &l.label == label)
                        .cloned()
                        .ok_or_else(|| EtlError::InvalidConfigValueError {
                            field: "--location".to_string(),
                            value: label.clone(),
                            reason: format!(
                                "Unknown location. Configured: {}",
                                vaccinations
                                    .locations
                                    .iter()
                                    .map(|l| l.label.as_str())
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            ),
                        })
                })
                .collect::<Result<Vec<_>>>()?
        };

        let client = SearchIndexClient::new(
            &vaccinations.base_url,
            &credentials,
            vaccinations.page_size,
            &vaccinations.scroll_keep_alive,
            config.request_timeout(),
        )?;

        Ok(Self::new(storage, client, locations, show_progress))
    }

    async fn export_location(
        &self,
        location: &LocationConfig,
        report: &mut ExportReport,
    ) -> Result<()> {
        let query = location_query(location);
        tracing::info!(
            "Starting to retrieve vaccination data for {} ({})",
            location.municipality,
            location.state
        );
        tracing::debug!("Query = {}", query.to_json());

        let total_hits = self.client.count(&query).await?;
        tracing::info!("Total hits = {}", total_hits);

        let mut exporter =
            CsvExporter::create(&self.storage, &location.output_file(), &VACCINATION_COLUMNS)?;
        let progress = create_progress_bar(total_hits, &location.label, self.show_progress);

        let mut scan = self.client.scan(&query);
        while let Some(document) = scan.next_hit().await? {
            report.records_scanned += 1;
            exporter.write_row(vaccination_row(&document))?;
            progress.inc(1);
        }
        progress.finish_and_clear();

        let written = exporter.rows_written();
        if written != total_hits {
            tracing::warn!(
                "{}: count reported {} hits but the scroll returned {}",
                location.label,
                total_hits,
                written
            );
        }
        report.rows_written += written;
        let path = exporter.commit(&self.storage)?;
        tracing::info!("Saved {} rows to {}", written, path.display());
        report.output_files.push(path);
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for VaccinationExportPipeline<S> {
    fn name(&self) -> &str {
        PIPELINE_NAME
    }

    async fn run(&self) -> Result<ExportReport> {
        let mut report = ExportReport::new(PIPELINE_NAME);
        for location in &self.locations {
            self.export_location(location, &mut report).await?;
        }
        Ok(report.finish())
    }
}
