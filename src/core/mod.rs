pub mod case_export;
pub mod etl;
pub mod vaccination_export;

pub use crate::domain::model::{ExportReport, Record};
pub use crate::domain::ports::{Pipeline, Storage};
pub use crate::utils::error::Result;
