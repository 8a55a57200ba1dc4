mod cli;
mod error;
mod exporter;
mod fmt;
mod importer;
mod location;
mod models;
mod normalizer;
mod pipeline;
mod rules;
mod settings;

use std::fs::File;
use std::sync::Mutex;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::{prelude::*, EnvFilter};

use cli::run::RunArgs;
use cli::{Cli, Commands, RulesCommands};

/// Human-readable logs on stderr (`RUST_LOG` overrides the `info` default),
/// plus a plain copy in `log_file` when one is configured.
fn init_logging(log_file: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let mut file_error = None;
    let file_layer = log_file.and_then(|path| {
        match File::create(settings::shellexpand_path(path)) {
            Ok(file) => Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                file_error = Some(format!("cannot open log file {path}: {e}"));
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if let Some(msg) = file_error {
        warn!("{msg}");
    }
}

fn main() {
    let cli = Cli::parse();
    let (settings, settings_error) = match settings::load_settings() {
        Ok(settings) => (settings, None),
        Err(e) => (settings::Settings::default(), Some(e)),
    };
    init_logging(settings.log_file.as_deref());
    if let Some(e) = settings_error {
        warn!("{e}; using default settings");
    }

    let result = match cli.command {
        Commands::Init { force } => cli::init::run(&settings, force),
        Commands::Run {
            input,
            rules,
            output,
            unassigned,
            links,
            no_links,
            encoding,
        } => cli::run::run(
            &settings,
            RunArgs {
                input,
                rules,
                output,
                unassigned,
                links: cli::links_flag(links, no_links),
                encoding,
            },
        ),
        Commands::Rules { command } => match command {
            RulesCommands::List { rules } => cli::rules::list(&settings, rules.as_deref()),
            RulesCommands::Check { rules } => cli::rules::check(&settings, rules.as_deref()),
            RulesCommands::Test {
                description,
                location,
                rules,
            } => cli::rules::test(&settings, &description, location.as_deref(), rules.as_deref()),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
