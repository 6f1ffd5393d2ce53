use crate::domain::ports::Storage;
use crate::utils::error::Result;
use serde_json::Value;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

/// Output written under a temporary name next to its target.
///
/// Dropped without [`Storage::commit`], the temporary file is removed and the
/// target keeps its previous contents.
pub struct StagedFile {
    file: BufWriter<NamedTempFile>,
    target: PathBuf,
}

impl StagedFile {
    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Storage for LocalStorage {
    type Writer = StagedFile;

    fn create(&self, name: &str) -> Result<Self::Writer> {
        let target = self.base_path.join(name);
        let parent = target.parent().unwrap_or(self.base_path.as_path());
        fs::create_dir_all(parent)?;

        let temp = tempfile::Builder::new()
            .prefix(".health-etl-")
            .suffix(".partial")
            .tempfile_in(parent)?;
        tracing::debug!(
            "Staging {} at {}",
            target.display(),
            temp.path().display()
        );
        Ok(StagedFile {
            file: BufWriter::new(temp),
            target,
        })
    }

    fn commit(&self, staged: Self::Writer) -> Result<PathBuf> {
        let StagedFile { file, target } = staged;
        let temp = file.into_inner().map_err(|e| e.into_error())?;
        temp.persist(&target).map_err(|e| e.error)?;
        Ok(target)
    }
}

/// CSV output with a fixed header, written row by row.
pub struct CsvExporter<W: Write> {
    writer: csv::Writer<W>,
    rows: u64,
}

impl<W: Write> CsvExporter<W> {
    /// Writes the header immediately, so even an empty export has it.
    pub fn new(inner: W, header: &[&str]) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b',')
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(header)?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn create<S: Storage<Writer = W>>(
        storage: &S,
        name: &str,
        header: &[&str],
    ) -> Result<Self> {
        Self::new(storage.create(name)?, header)
    }

    pub fn write_row<I, S>(&mut self, cells: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        self.writer.write_record(cells)?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Flushes every row and hands back the underlying writer.
    pub fn finish(self) -> Result<W> {
        let mut inner = self.writer.into_inner().map_err(|e| {
            let error = e.error();
            io::Error::new(error.kind(), error.to_string())
        })?;
        inner.flush()?;
        Ok(inner)
    }

    /// Flushes and publishes the file through `storage`.
    pub fn commit<S: Storage<Writer = W>>(self, storage: &S) -> Result<PathBuf> {
        let rows = self.rows;
        let path = storage.commit(self.finish()?)?;
        tracing::debug!("Wrote {} rows to {}", rows, path.display());
        Ok(path)
    }
}

/// Renders a JSON value the way it should appear in a CSV cell.
pub fn value_to_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (None, Some(u), _) => u.to_string(),
            (None, None, Some(f)) => float_to_cell(f),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        nested => nested.to_string(),
    }
}

/// Whole floats keep one decimal (`24.0`), others use the shortest round-trip form.
pub fn float_to_cell(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}
