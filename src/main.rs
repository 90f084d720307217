//! glm-manager entry point: CLI wiring and recipe-driven model preparation.

use std::io::{self, Write};
use std::process;

use tracing::{error, info};

use glm_manager::cli::{self, CliCommand, CliOptions};
use glm_manager::config::PrepConfig;
use glm_manager::io::export::export_inventory;
use glm_manager::manager::GlmManager;
use glm_manager::prep;

fn init_tracing(verbose: bool) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: could not install log subscriber: {e}");
    }
}

/// Loads the recipe: `--recipe` takes priority, then `--preset`, then passthrough.
fn load_recipe(cli: &CliOptions) -> Result<PrepConfig, String> {
    let recipe = if let Some(ref path) = cli.recipe {
        PrepConfig::from_toml_file(path)
    } else if let Some(ref name) = cli.preset {
        PrepConfig::from_preset(name)
    } else {
        Ok(PrepConfig::passthrough())
    };
    recipe.map_err(|e| e.to_string())
}

fn run(cli: &CliOptions) -> Result<GlmManager, String> {
    let recipe = load_recipe(cli)?;
    let errors = recipe.validate();
    if !errors.is_empty() {
        let lines: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(lines.join("\n"));
    }

    let mut manager = GlmManager::from_glm_file(&cli.input)
        .map_err(|e| format!("failed to load {}: {e}", cli.input.display()))?;
    let report = prep::apply(&mut manager, &recipe).map_err(|e| e.to_string())?;
    info!(?report, "preparation finished");

    match cli.output {
        Some(ref path) => manager.write_model(path).map_err(|e| e.to_string())?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(manager.render().as_bytes())
                .map_err(|e| format!("failed to write model to stdout: {e}"))?;
        }
    }

    if let Some(ref path) = cli.inventory_out {
        export_inventory(manager.model(), path)
            .map_err(|e| format!("failed to write inventory CSV: {e}"))?;
        info!(path = %path.display(), "inventory written");
    }

    Ok(manager)
}

#[cfg(feature = "api")]
fn serve(manager: GlmManager, port: u16) {
    use std::net::SocketAddr;
    use std::sync::Arc;

    let state = Arc::new(glm_manager::api::AppState::new(manager));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        error!("failed to create tokio runtime: {e}");
        process::exit(1);
    });
    if let Err(e) = rt.block_on(glm_manager::api::serve(state, addr)) {
        error!("server error: {e}");
        process::exit(1);
    }
}

#[cfg(not(feature = "api"))]
fn serve(_manager: GlmManager, _port: u16) {
    error!("--serve requires a build with the `api` feature");
    process::exit(1);
}

fn main() {
    let cli = match cli::parse_args() {
        Ok(CliCommand::Run(opts)) => opts,
        Ok(CliCommand::Help) => {
            cli::print_usage();
            return;
        }
        Err(e) => {
            eprintln!("error: {e}");
            cli::print_usage();
            process::exit(2);
        }
    };
    init_tracing(cli.verbose);

    let manager = match run(&cli) {
        Ok(manager) => manager,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    if cli.serve {
        serve(manager, cli.port);
    }
}
