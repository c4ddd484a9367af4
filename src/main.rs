use std::{process, sync::Arc};

use rendition_engine::{
    application::registry::{
        ConfigSource, RegistryReloader, RenditionDefinitionRegistry, parse_document,
    },
    config::{self, Command, Settings},
    infra::{
        capabilities::TransformCapabilityTable, config_source::DirectoryConfigSource,
        error::InfraError, telemetry,
    },
};
use thiserror::Error;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("{source_name}: {message}")]
    Source {
        source_name: String,
        message: String,
    },
    #[error("{failed} of {total} definition documents are invalid")]
    InvalidDocuments { failed: usize, total: usize },
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &CliError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), CliError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    match cli_args.command.unwrap_or(Command::Watch) {
        Command::Check => run_check(&settings),
        Command::List => run_list(&settings),
        Command::Watch => run_watch(settings).await,
    }
}

fn definition_source(settings: &Settings) -> DirectoryConfigSource {
    DirectoryConfigSource::new(settings.renditions.definitions_dir.clone())
}

fn empty_registry() -> Arc<RenditionDefinitionRegistry> {
    Arc::new(RenditionDefinitionRegistry::new(Arc::new(
        TransformCapabilityTable::new(),
    )))
}

/// Parses every document and reports rejected entries without touching a registry.
fn run_check(settings: &Settings) -> Result<(), CliError> {
    let source = definition_source(settings);
    let documents = source.read_documents().map_err(|err| CliError::Source {
        source_name: err.source_name,
        message: err.message,
    })?;

    let total = documents.len();
    let mut failed = 0;
    for document in documents {
        match parse_document(&document.text) {
            Ok(parsed) => {
                for rejected in &parsed.rejected {
                    warn!(document = %document.name, error = %rejected, "invalid entry");
                }
                if !parsed.rejected.is_empty() {
                    failed += 1;
                }
                for definition in &parsed.definitions {
                    println!(
                        "{}\t{}\t{}\t{} option(s)",
                        document.name,
                        definition.name(),
                        definition.target_media_type(),
                        definition.options().len()
                    );
                }
            }
            Err(err) => {
                warn!(document = %document.name, error = %err, "invalid document");
                failed += 1;
            }
        }
    }

    info!(
        dir = %source.dir().display(),
        documents = total,
        failed,
        "definition check finished"
    );
    if failed > 0 {
        return Err(CliError::InvalidDocuments { failed, total });
    }
    Ok(())
}

fn run_list(settings: &Settings) -> Result<(), CliError> {
    let registry = empty_registry();
    let sources: Vec<Arc<dyn ConfigSource>> = vec![Arc::new(definition_source(settings))];
    let report = registry.reload(&sources);
    if !report.is_clean() {
        warn!(
            skipped = report.skipped_entries,
            failed_documents = report.failed_documents,
            failed_sources = report.failed_sources,
            "some definitions could not be loaded"
        );
    }

    for name in registry.names() {
        if let Some(definition) = registry.get(&name) {
            println!("{}\t{}", definition.name(), definition.target_media_type());
        }
    }
    Ok(())
}

async fn run_watch(settings: Settings) -> Result<(), CliError> {
    if !settings.renditions.is_enabled() {
        warn!("renditions are disabled; definitions are still reloaded");
    }

    let registry = empty_registry();
    let sources: Vec<Arc<dyn ConfigSource>> = vec![Arc::new(definition_source(&settings))];
    let reloader = RegistryReloader::new(
        Arc::clone(&registry),
        sources,
        settings.renditions.reload_cron.clone(),
        settings.renditions.initial_and_on_error_cron.clone(),
    );

    info!(
        dir = %settings.renditions.definitions_dir.display(),
        "watching rendition definitions"
    );
    reloader
        .run(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to listen for shutdown signal");
            }
        })
        .await;

    info!(registered = registry.len(), "renditiond stopped");
    Ok(())
}
