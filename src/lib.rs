pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{CliConfig, Command};

pub use adapters::storage::LocalStorage;
pub use config::EtlConfig;
pub use core::{
    case_export::CaseExportPipeline, etl::EtlEngine,
    vaccination_export::VaccinationExportPipeline,
};
pub use utils::error::{EtlError, Result};
