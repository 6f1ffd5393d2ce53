use crate::adapters::http::auth::Credentials;
use crate::adapters::http::{brasil_io, search_index};
use crate::adapters::storage::value_to_cell;
use crate::domain::filter::{AllowList, Identifier};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "health-etl.toml";

const BUILTIN_CONFIG: &str = include_str!("../../config/health-etl.toml");

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    #[serde(default)]
    pub output: OutputConfig,
    pub http: Option<HttpConfig>,
    pub cases: Option<CasesConfig>,
    pub vaccinations: Option<VaccinationsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasesConfig {
    #[serde(default = "default_cases_base_url")]
    pub base_url: String,
    /// Environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_cases_output_file")]
    pub output_file: String,
    pub regions: Vec<RegionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub state: String,
    pub city_codes: Vec<Identifier>,
    /// Extra query parameters; defaults to `is_last = "True"`.
    pub filters: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaccinationsConfig {
    #[serde(default = "default_vaccinations_base_url")]
    pub base_url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_keep_alive")]
    pub scroll_keep_alive: String,
    pub locations: Vec<LocationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    pub label: String,
    pub municipality: String,
    pub state: String,
}

fn default_output_directory() -> String {
    "data".to_string()
}

fn default_cases_base_url() -> String {
    brasil_io::DEFAULT_BASE_URL.to_string()
}

fn default_token_env() -> String {
    "BRASIL_IO_TOKEN".to_string()
}

fn default_dataset() -> String {
    "covid19".to_string()
}

fn default_table() -> String {
    "caso_full".to_string()
}

fn default_cases_output_file() -> String {
    "df_dados_macro_regioes.csv".to_string()
}

fn default_vaccinations_base_url() -> String {
    search_index::DEFAULT_BASE_URL.to_string()
}

fn default_page_size() -> usize {
    1000
}

fn default_keep_alive() -> String {
    "5m".to_string()
}

impl EtlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| EtlError::ConfigError {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Self =
            toml::from_str(content).map_err(|e| EtlError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: format!("TOML parsing error: {}", e),
            })?;
        config.expand_env_vars();
        Ok(config)
    }

    /// The macro-region lists shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CONFIG)
    }

    /// Explicit path, else `health-etl.toml` in the working directory, else the built-in lists.
    pub fn load(path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = path {
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            return Ok((Self::from_file(local)?, Some(local.to_path_buf())));
        }
        Ok((Self::builtin()?, None))
    }

    /// Expands placeholders in parsed string values; the TOML text itself is never rewritten.
    fn expand_env_vars(&mut self) {
        substitute_env_vars(&mut self.output.directory);
        if let Some(cases) = &mut self.cases {
            substitute_env_vars(&mut cases.base_url);
        }
        if let Some(vaccinations) = &mut self.vaccinations {
            substitute_env_vars(&mut vaccinations.base_url);
            substitute_env_vars(&mut vaccinations.username);
            substitute_env_vars(&mut vaccinations.password);
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.http
            .as_ref()
            .and_then(|h| h.timeout_seconds)
            .map(Duration::from_secs)
    }

    pub fn cases(&self) -> Result<&CasesConfig> {
        self.cases.as_ref().ok_or_else(|| EtlError::MissingConfigError {
            field: "cases".to_string(),
        })
    }

    pub fn vaccinations(&self) -> Result<&VaccinationsConfig> {
        self.vaccinations
            .as_ref()
            .ok_or_else(|| EtlError::MissingConfigError {
                field: "vaccinations".to_string(),
            })
    }
}

/// `${VAR}` is replaced by the variable's value; unset variables are left as written.
fn substitute_env_vars(value: &mut String) {
    if !PLACEHOLDER.is_match(value) {
        return;
    }
    let expanded = PLACEHOLDER
        .replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .into_owned();
    *value = expanded;
}

impl RegionConfig {
    pub fn allow_list(&self) -> AllowList {
        AllowList::new(&self.city_codes)
    }

    /// `state` first, then the configured filters in key order.
    pub fn query_filters(&self) -> Vec<(String, String)> {
        let mut filters = vec![("state".to_string(), self.state.clone())];
        match &self.filters {
            Some(extra) => filters.extend(
                extra
                    .iter()
                    .filter(|(key, _)| key.as_str() != "state")
                    .map(|(key, value)| (key.clone(), value_to_cell(value))),
            ),
            None => filters.push(("is_last".to_string(), "True".to_string())),
        }
        filters
    }
}

impl VaccinationsConfig {
    /// Basic credentials; a placeholder left unresolved means its variable is missing.
    pub fn credentials(&self) -> Result<Credentials> {
        let username = resolved("vaccinations.username", &self.username)?;
        let password = resolved("vaccinations.password", &self.password)?;
        Ok(Credentials::basic(username, password))
    }
}

impl LocationConfig {
    pub fn output_file(&self) -> String {
        format!("vaccines-{}-{}.csv", self.municipality, self.state)
    }
}

fn resolved<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    if let Some(caps) = PLACEHOLDER.captures(value) {
        return Err(EtlError::MissingCredentialError {
            variable: caps[1].to_string(),
        });
    }
    if value.is_empty() {
        return Err(EtlError::MissingConfigError {
            field: field.to_string(),
        });
    }
    Ok(value)
}

impl Validate for EtlConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("output.directory", &self.output.directory)?;

        if let Some(cases) = &self.cases {
            validation::validate_url("cases.base_url", &cases.base_url)?;
            validation::validate_non_empty_string("cases.token_env", &cases.token_env)?;
            validation::validate_non_empty_string("cases.dataset", &cases.dataset)?;
            validation::validate_non_empty_string("cases.table", &cases.table)?;
            validation::validate_file_name("cases.output_file", &cases.output_file)?;
            validation::validate_non_empty_list("cases.regions", &cases.regions)?;
            for region in &cases.regions {
                validation::validate_non_empty_string("cases.regions.state", &region.state)?;
                validation::validate_non_empty_list(
                    &format!("cases.regions[{}].city_codes", region.state),
                    &region.city_codes,
                )?;
            }
        }

        if let Some(vaccinations) = &self.vaccinations {
            validation::validate_url("vaccinations.base_url", &vaccinations.base_url)?;
            validation::validate_positive_number(
                "vaccinations.page_size",
                vaccinations.page_size,
                1,
            )?;
            validation::validate_non_empty_string(
                "vaccinations.scroll_keep_alive",
                &vaccinations.scroll_keep_alive,
            )?;
            validation::validate_non_empty_list(
                "vaccinations.locations",
                &vaccinations.locations,
            )?;
            validation::validate_unique(
                "vaccinations.locations.label",
                vaccinations.locations.iter().map(|l| l.label.as_str()),
            )?;
            for location in &vaccinations.locations {
                validation::validate_non_empty_string(
                    "vaccinations.locations.municipality",
                    &location.municipality,
                )?;
                validation::validate_non_empty_string(
                    "vaccinations.locations.state",
                    &location.state,
                )?;
                validation::validate_file_name(
                    "vaccinations.locations",
                    &location.output_file(),
                )?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_config_is_valid() {
        let config = EtlConfig::builtin().unwrap();
        config.validate().unwrap();

        let cases = config.cases().unwrap();
        assert_eq!(cases.dataset, "covid19");
        assert_eq!(cases.table, "caso_full");
        assert_eq!(cases.regions.len(), 2);
        assert_eq!(cases.regions[0].state, "CE");
        // 2310100 is listed twice for CE.
        assert_eq!(cases.regions[0].city_codes.len(), 31);
        assert_eq!(cases.regions[0].allow_list().len(), 30);
        assert_eq!(cases.regions[1].allow_list().len(), 9);

        let vaccinations = config.vaccinations().unwrap();
        let files: Vec<String> = vaccinations
            .locations
            .iter()
            .map(LocationConfig::output_file)
            .collect();
        assert_eq!(
            files,
            vec![
                "vaccines-REDENCAO-CE.csv",
                "vaccines-ACARAPE-CE.csv",
                "vaccines-SAO FRANCISCO DO CONDE-BA.csv",
            ]
        );
    }

    #[test]
    fn test_defaults_for_minimal_cases_section() {
        let config = EtlConfig::from_toml_str(
            r#"
[[cases.regions]]
state = "BA"
city_codes = [2929206, "2906501"]
"#,
        )
        .unwrap();

        assert_eq!(config.output.directory, "data");
        assert!(config.vaccinations.is_none());
        assert!(config.request_timeout().is_none());
        let cases = config.cases().unwrap();
        assert_eq!(cases.base_url, "https://api.brasil.io/v1/");
        assert_eq!(cases.token_env, "BRASIL_IO_TOKEN");
        assert_eq!(cases.output_file, "df_dados_macro_regioes.csv");

        let allow = cases.regions[0].allow_list();
        assert!(allow.contains(&json!(2906501)));
        assert_eq!(
            cases.regions[0].query_filters(),
            vec![
                ("state".to_string(), "BA".to_string()),
                ("is_last".to_string(), "True".to_string()),
            ]
        );
        assert!(matches!(
            config.vaccinations(),
            Err(EtlError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_region_filters_are_rendered() {
        let config = EtlConfig::from_toml_str(
            r#"
[http]
timeout_seconds = 30

[[cases.regions]]
state = "CE"
city_codes = [1]
filters = { is_last = true, date = "2021-03-01", state = "ignored" }
"#,
        )
        .unwrap();

        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(
            config.cases().unwrap().regions[0].query_filters(),
            vec![
                ("state".to_string(), "CE".to_string()),
                ("date".to_string(), "2021-03-01".to_string()),
                ("is_last".to_string(), "True".to_string()),
            ]
        );
    }

    #[test]
    fn test_env_var_substitution_and_unresolved_credentials() {
        std::env::set_var("HEALTH_ETL_TEST_ES_USER", "public_user");

        let config = EtlConfig::from_toml_str(
            r#"
[vaccinations]
username = "${HEALTH_ETL_TEST_ES_USER}"
password = "${HEALTH_ETL_TEST_ES_PASSWORD_UNSET}"

[[vaccinations.locations]]
label = "Acarape"
municipality = "ACARAPE"
state = "CE"
"#,
        )
        .unwrap();

        let vaccinations = config.vaccinations().unwrap();
        assert_eq!(vaccinations.username, "public_user");
        assert_eq!(vaccinations.page_size, 1000);
        assert_eq!(vaccinations.scroll_keep_alive, "5m");
        match vaccinations.credentials() {
            Err(EtlError::MissingCredentialError { variable }) => {
                assert_eq!(variable, "HEALTH_ETL_TEST_ES_PASSWORD_UNSET")
            }
            other => panic!("unexpected result: {other:?}"),
        }

        std::env::remove_var("HEALTH_ETL_TEST_ES_USER");
    }

    #[test]
    fn test_substituted_values_are_not_parsed_as_toml() {
        let password = r#"p"w\d" # = [x]"#;
        std::env::set_var("HEALTH_ETL_TEST_ES_QUOTED_PASSWORD", password);
        std::env::set_var("HEALTH_ETL_TEST_ES_QUOTED_USER", "user\"\ninjected = 1");

        let config = EtlConfig::from_toml_str(
            r#"
[vaccinations]
username = "${HEALTH_ETL_TEST_ES_QUOTED_USER}"
password = "prefix-${HEALTH_ETL_TEST_ES_QUOTED_PASSWORD}"

[[vaccinations.locations]]
label = "Acarape"
municipality = "ACARAPE"
state = "CE"
"#,
        )
        .unwrap();

        let vaccinations = config.vaccinations().unwrap();
        assert_eq!(vaccinations.username, "user\"\ninjected = 1");
        assert_eq!(vaccinations.password, format!("prefix-{}", password));
        assert!(vaccinations.credentials().is_ok());

        std::env::remove_var("HEALTH_ETL_TEST_ES_QUOTED_PASSWORD");
        std::env::remove_var("HEALTH_ETL_TEST_ES_QUOTED_USER");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let empty_codes = EtlConfig::from_toml_str(
            r#"
[[cases.regions]]
state = "CE"
city_codes = []
"#,
        )
        .unwrap();
        assert!(empty_codes.validate().is_err());

        let bad_url = EtlConfig::from_toml_str(
            r#"
[cases]
base_url = "not a url"

[[cases.regions]]
state = "CE"
city_codes = [1]
"#,
        )
        .unwrap();
        assert!(bad_url.validate().is_err());

        let duplicate_labels = EtlConfig::from_toml_str(
            r#"
[vaccinations]
username = "u"
password = "p"

[[vaccinations.locations]]
label = "A"
municipality = "ACARAPE"
state = "CE"

[[vaccinations.locations]]
label = "A"
municipality = "REDENCAO"
state = "CE"
"#,
        )
        .unwrap();
        assert!(duplicate_labels.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(
                br#"
[output]
directory = "exports"

[[cases.regions]]
state = "CE"
city_codes = [2300150]
"#,
            )
            .unwrap();

        let (config, source) = EtlConfig::load(Some(temp_file.path())).unwrap();
        assert_eq!(config.output.directory, "exports");
        assert_eq!(source.as_deref(), Some(temp_file.path()));

        assert!(EtlConfig::from_file("/nonexistent/health-etl.toml").is_err());
    }
}
