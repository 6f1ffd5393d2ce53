use crate::domain::model::ExportReport;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;

/// Where export files are created.
pub trait Storage: Send + Sync {
    type Writer: Write + Send;

    /// Opens a writer for `name`. An existing file of that name is left
    /// untouched until the writer is committed.
    fn create(&self, name: &str) -> Result<Self::Writer>;

    /// Publishes a finished writer under its name and returns the final path.
    fn commit(&self, writer: Self::Writer) -> Result<PathBuf>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<ExportReport>;
}
