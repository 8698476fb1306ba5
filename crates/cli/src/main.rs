mod config_commands;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    modelswitch_backend::{HttpProviderBackend, ResolverDriver},
    modelswitch_config::{
        ModelswitchConfig, Severity,
        watcher::{ConfigWatchEvent, ConfigWatcher},
    },
    modelswitch_resolver::{
        FileSelectionStore, InMemorySelection, ResolverSession, Selection, SelectionStore,
        tables::{CREDENTIAL_TYPES, REGISTRY_OVERRIDES},
    },
    modelswitch_service_traits::ProviderBackend,
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use config_commands::ConfigAction;

#[derive(Parser)]
#[command(
    name = "modelswitch",
    about = "Pick the active AI provider and model from a local credential backend"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Explicit config file (skips discovery).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Custom config directory (overrides default ~/.config/modelswitch/).
    #[arg(long, global = true, env = "MODELSWITCH_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch backend state once, settle the selection, and print it as JSON.
    Resolve {
        /// Switch to this provider key after the initial choice.
        #[arg(long)]
        provider: Option<String>,
        /// Switch to this model after the initial choice.
        #[arg(long)]
        model: Option<String>,
        /// Keep the selection in memory instead of the state file.
        #[arg(long, default_value_t = false)]
        no_persist: bool,
    },
    /// Poll the backend and print the view every time it changes.
    ///
    /// Edits to the `[backend]` or `[polling]` config sections apply without
    /// a restart.
    Watch {
        /// Keep the selection in memory instead of the state file.
        #[arg(long, default_value_t = false)]
        no_persist: bool,
    },
    /// List known OAuth credential types and registry id overrides.
    Providers,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries command output.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Load the effective config: an explicit file, or discovery, then env overrides.
pub(crate) fn load_config(path: Option<&Path>) -> anyhow::Result<ModelswitchConfig> {
    match path {
        Some(path) => {
            let mut config = modelswitch_config::load_config(path)?;
            modelswitch_config::apply_env_overrides(&mut config);
            Ok(config)
        },
        None => Ok(modelswitch_config::discover_and_load()),
    }
}

fn open_store(config: &ModelswitchConfig) -> FileSelectionStore {
    let store = match config.selection.state_file_path() {
        Some(path) => FileSelectionStore::open(path),
        None => FileSelectionStore::open_default(),
    };
    store.with_fallback(initial_selection(config))
}

fn initial_selection(config: &ModelswitchConfig) -> Selection {
    Selection::new(
        config.selection.provider.clone().unwrap_or_default(),
        config.selection.model.clone().unwrap_or_default(),
    )
}

fn connect(config: &ModelswitchConfig) -> anyhow::Result<Arc<dyn ProviderBackend>> {
    if !config.backend.is_loopback() && config.backend.api_key.is_none() {
        warn!(url = %config.backend.base_url, "remote backend configured without an api_key");
    }
    let backend = HttpProviderBackend::new(&config.backend)
        .with_context(|| format!("invalid backend URL {}", config.backend.base_url))?;
    info!(url = %backend.base_url(), "using backend");
    Ok(Arc::new(backend))
}

async fn resolve<S: SelectionStore + 'static>(
    backend: Arc<dyn ProviderBackend>,
    store: S,
    provider: Option<String>,
    model: Option<String>,
) -> anyhow::Result<()> {
    let driver = ResolverDriver::new(backend, ResolverSession::new(store));
    let (mut events, refresh) = tokio::join!(driver.resolve_default(), driver.refresh_once(true));
    events.extend(refresh.events);
    if !refresh.registry_refreshed {
        warn!("model registry unavailable, model list will be empty");
    }

    if let Some(provider) = provider {
        events.extend(driver.select_provider(provider).await);
    }
    if let Some(model) = model {
        events.extend(driver.select_model(model).await);
    }

    for event in &events {
        info!(event = %serde_json::to_string(event)?, "selection changed");
    }
    println!("{}", serde_json::to_string_pretty(&driver.view().await)?);
    Ok(())
}

async fn watch<S: SelectionStore + 'static>(
    backend: Arc<dyn ProviderBackend>,
    store: S,
    mut config: ModelswitchConfig,
    config_path: PathBuf,
) -> anyhow::Result<()> {
    let driver = Arc::new(ResolverDriver::new(backend, ResolverSession::new(store)));
    let mut handle = Arc::clone(&driver).spawn(&config.polling);
    let mut views = driver.subscribe();

    let (_watcher, mut reloads) = match ConfigWatcher::start(config_path.clone()) {
        Ok((watcher, rx)) => (Some(watcher), Some(rx)),
        Err(e) => {
            warn!(error = %e, "config hot reload unavailable");
            (None, None)
        },
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping");
                break;
            }
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&view)?);
            }
            Some(ConfigWatchEvent::Changed(path)) = next_reload(&mut reloads) => {
                let Some(next) = reload_config(&path) else {
                    continue;
                };
                let plan = ReloadPlan::between(&config, &next);
                if plan.is_empty() {
                    debug!("config changed without affecting the running watch");
                    config = next;
                    continue;
                }
                if plan.backend {
                    match connect(&next) {
                        Ok(backend) => driver.replace_backend(backend).await,
                        Err(e) => {
                            warn!(error = %e, "keeping previous backend");
                            continue;
                        },
                    }
                }
                handle.shutdown().await;
                handle = Arc::clone(&driver).spawn(&next.polling);
                info!(backend = plan.backend, polling = plan.polling, "config reloaded");
                config = next;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

async fn next_reload(
    reloads: &mut Option<mpsc::UnboundedReceiver<ConfigWatchEvent>>,
) -> Option<ConfigWatchEvent> {
    match reloads {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Re-read the config after an edit. Unreadable or invalid files keep the
/// running configuration.
fn reload_config(path: &Path) -> Option<ModelswitchConfig> {
    let next = match load_config(Some(path)) {
        Ok(next) => next,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring config change");
            return None;
        },
    };
    let errors: Vec<_> = modelswitch_config::validate::validate_config(&next)
        .into_iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    if let Some(first) = errors.first() {
        warn!(
            path = %path.display(),
            errors = errors.len(),
            first = %format!("{}: {}", first.path, first.message),
            "ignoring invalid config change"
        );
        return None;
    }
    Some(next)
}

/// Which parts of a running `watch` a config edit touches.
#[derive(Debug, Default, PartialEq, Eq)]
struct ReloadPlan {
    backend: bool,
    polling: bool,
}

impl ReloadPlan {
    fn between(old: &ModelswitchConfig, new: &ModelswitchConfig) -> Self {
        Self {
            backend: old.backend != new.backend,
            polling: old.polling != new.polling,
        }
    }

    fn is_empty(&self) -> bool {
        !self.backend && !self.polling
    }
}

fn print_providers() {
    println!("OAuth credential types:");
    for entry in CREDENTIAL_TYPES {
        println!(
            "  {:<16} {:<18} -> {}",
            entry.provider_type, entry.label, entry.registry_id
        );
    }
    println!("\nRegistry id overrides:");
    for (id, registry_id) in REGISTRY_OVERRIDES {
        println!("  {id:<22} -> {registry_id}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "modelswitch starting");

    if let Some(ref dir) = cli.config_dir {
        modelswitch_config::set_config_dir(dir.clone());
    }

    match cli.command {
        Commands::Resolve {
            provider,
            model,
            no_persist,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let backend = connect(&config)?;
            if no_persist {
                let store = InMemorySelection::new(initial_selection(&config));
                resolve(backend, store, provider, model).await
            } else {
                resolve(backend, open_store(&config), provider, model).await
            }
        },
        Commands::Watch { no_persist } => {
            let config = load_config(cli.config.as_deref())?;
            let backend = connect(&config)?;
            let config_path = cli
                .config
                .clone()
                .unwrap_or_else(modelswitch_config::find_or_default_config_path);
            if no_persist {
                let store = InMemorySelection::new(initial_selection(&config));
                watch(backend, store, config, config_path).await
            } else {
                let store = open_store(&config);
                watch(backend, store, config, config_path).await
            }
        },
        Commands::Providers => {
            print_providers();
            Ok(())
        },
        Commands::Config { action } => {
            config_commands::handle_config(action, cli.config.as_deref())
        },
    }
}
