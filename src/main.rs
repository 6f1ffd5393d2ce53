use clap::Parser;
use health_etl::domain::ports::Pipeline;
use health_etl::utils::{logger, validation::Validate};
use health_etl::{
    CaseExportPipeline, CliConfig, Command, EtlConfig, EtlEngine, EtlError, LocalStorage,
    VaccinationExportPipeline,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Ignoring unreadable .env file: {}", e),
    }

    if let Err(e) = run(cli).await {
        exit_with(&e);
    }
}

async fn run(cli: CliConfig) -> health_etl::Result<()> {
    let (mut config, source) = EtlConfig::load(cli.config.as_deref())?;
    match &source {
        Some(path) => tracing::info!("Loaded configuration from {}", path.display()),
        None => tracing::info!("Using built-in region configuration"),
    }
    cli.apply_overrides(&mut config);
    config.validate()?;
    if cli.verbose {
        tracing::debug!("Configuration: {:?}", config);
    }

    let storage = LocalStorage::new(&config.output.directory);
    match &cli.command {
        Command::Cases => {
            let pipeline = CaseExportPipeline::from_config(&config, storage)?;
            execute(pipeline, cli.monitor).await
        }
        Command::Vaccinations { locations } => {
            let pipeline = VaccinationExportPipeline::from_config(
                &config,
                storage,
                locations,
                !cli.no_progress,
            )?;
            execute(pipeline, cli.monitor).await
        }
    }
}

async fn execute<P: Pipeline>(pipeline: P, monitor: bool) -> health_etl::Result<()> {
    let engine = EtlEngine::new_with_monitoring(pipeline, monitor);
    let report = engine.run().await?;
    if let Ok(summary) = serde_json::to_string(&report) {
        tracing::debug!("Report: {}", summary);
    }
    println!("✅ {} export completed", report.pipeline);
    for path in &report.output_files {
        println!("📁 Output saved to: {}", path.display());
    }
    Ok(())
}

fn exit_with(e: &EtlError) -> ! {
    tracing::error!(
        "❌ Run failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
    std::process::exit(e.exit_code());
}
