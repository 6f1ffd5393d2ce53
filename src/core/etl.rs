use crate::core::{ExportReport, Pipeline};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: Option<SystemMonitor>,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<ExportReport> {
        let name = self.pipeline.name();
        tracing::info!("Starting {} export", name);
        if let Some(monitor) = &self.monitor {
            monitor.log_sample("Before export");
        }

        let result = self.pipeline.run().await;

        if let Some(monitor) = &self.monitor {
            monitor.log_sample("After export");
        }

        let report = result?;
        tracing::info!(
            "{} export finished in {:?}: {} rows written from {} records scanned",
            name,
            report.elapsed,
            report.rows_written,
            report.records_scanned
        );
        if report.rows_without_rate > 0 {
            tracing::warn!(
                "{} rows were exported without a per-capita rate",
                report.rows_without_rate
            );
        }
        for path in &report.output_files {
            tracing::info!("Output saved to: {}", path.display());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::EtlError;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubPipeline {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Pipeline for StubPipeline {
        fn name(&self) -> &str {
            "stub"
        }

        async fn run(&self) -> Result<ExportReport> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EtlError::malformed("stub", "boom"));
            }
            let mut report = ExportReport::new("stub");
            report.rows_written = 2;
            report.output_files.push(PathBuf::from("out.csv"));
            Ok(report.finish())
        }
    }

    #[tokio::test]
    async fn test_engine_returns_pipeline_report() {
        let engine = EtlEngine::new(StubPipeline {
            runs: AtomicUsize::new(0),
            fail: false,
        });
        let report = engine.run().await.unwrap();
        assert_eq!(report.pipeline, "stub");
        assert_eq!(report.rows_written, 2);
        assert_eq!(engine.pipeline.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_engine_propagates_errors_with_monitoring() {
        let engine = EtlEngine::new_with_monitoring(
            StubPipeline {
                runs: AtomicUsize::new(0),
                fail: true,
            },
            true,
        );
        let err = engine.run().await.unwrap_err();
        assert!(matches!(err, EtlError::MalformedResponseError { .. }));
    }
}
