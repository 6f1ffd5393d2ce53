use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}: {body}")]
    HttpStatusError {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {source_name}: {message}")]
    MalformedResponseError {
        source_name: String,
        message: String,
    },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Missing credential: environment variable {variable} is not set or empty")]
    MissingCredentialError { variable: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Data,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn malformed(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        EtlError::MalformedResponseError {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ApiError(_) | EtlError::HttpStatusError { .. } => ErrorCategory::Network,
            EtlError::MalformedResponseError { .. }
            | EtlError::CsvError(_) => ErrorCategory::Data,
            EtlError::IoError(_) => ErrorCategory::System,
            EtlError::UrlError(_)
            | EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::MissingCredentialError { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Data => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            EtlError::MissingCredentialError { variable } => format!(
                "Export {} in your shell or add it to a .env file in the working directory",
                variable
            ),
            EtlError::HttpStatusError { status: 401, .. }
            | EtlError::HttpStatusError { status: 403, .. } => {
                "Check that the API credentials are valid".to_string()
            }
            EtlError::HttpStatusError { status: 429, .. } => {
                "The API is throttling requests; wait a while before running again".to_string()
            }
            EtlError::HttpStatusError { .. } | EtlError::ApiError(_) => {
                "Check network connectivity and the configured base URL".to_string()
            }
            EtlError::MalformedResponseError { .. } => {
                "The API response format may have changed; run with --verbose to inspect it"
                    .to_string()
            }
            EtlError::IoError(_) | EtlError::CsvError(_) => {
                "Check that the output directory exists and is writable".to_string()
            }
            _ => match self.category() {
                ErrorCategory::Configuration => {
                    "Review the configuration file and command-line flags".to_string()
                }
                _ => "Run again with --verbose for more details".to_string(),
            },
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Network => format!("Could not fetch data: {}", self),
            ErrorCategory::Data => format!("Unexpected data: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
