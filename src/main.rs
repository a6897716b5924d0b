//! brewstrap - Homebrew bootstrap and service keeper
//!
//! This is the main entry point for the brewstrap CLI.

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use brewstrap::{
    api::create_router,
    config::{Commands, Config, PodmanAction, ProvisionConfig, ServicesAction},
    state::AppState,
    tasks::keep_alive_task,
    utils::shutdown_signal,
    Provisioner, SystemRunner,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("brewstrap={},tower_http=info", cli.log_level()))
        .init();

    let config = cli.provision_config()?;
    let cancel = CancellationToken::new();
    let runner = Arc::new(SystemRunner::new(config.command_timeout(), cancel.clone()));
    let provisioner = Provisioner::new(&config, runner, cancel.clone());

    match cli.command {
        Commands::Bootstrap => {
            let socket = provisioner.bootstrap().await?;
            println!("unix://{}", socket.display());
        }
        Commands::Teardown => provisioner.teardown().await?,
        Commands::Services { action } => run_services(&provisioner, action).await?,
        Commands::Info { name } => match provisioner.homebrew().info(&name).await? {
            Some(package) => println!("{} {} {}", package.name, package.version, package.path),
            None => println!("{} is not installed", name),
        },
        Commands::Install { name } => {
            provisioner.homebrew().ensure_installed(&name).await?;
        }
        Commands::Remove { name } => provisioner.homebrew().remove(&name).await?,
        Commands::BrewConfig => {
            for (key, value) in provisioner.homebrew().brew_config().await? {
                println!("{}: {}", key, value);
            }
        }
        Commands::Toolchains => {
            for package in provisioner.homebrew().ensure_toolchains().await? {
                println!("{} {}", package.name, package.version);
            }
        }
        Commands::Podman { action } => run_podman(&provisioner, action).await?,
        Commands::Serve { .. } => serve(&config, &provisioner, cancel).await?,
    }

    Ok(())
}

async fn run_services(provisioner: &Provisioner, action: ServicesAction) -> anyhow::Result<()> {
    let homebrew = provisioner.homebrew();
    match action {
        ServicesAction::List => {
            for service in homebrew.list_services().await? {
                println!(
                    "{:<24} {:<10} {:<10} {}",
                    service.name,
                    service.status,
                    service.user.as_deref().unwrap_or("-"),
                    service.file.as_deref().unwrap_or("-")
                );
            }
        }
        ServicesAction::Start { name } => homebrew.ensure_started(&name).await?,
        ServicesAction::Stop { name } => homebrew.ensure_stopped(&name).await?,
        ServicesAction::Check { name, status } => {
            if !homebrew.check_status(&name, &status).await? {
                anyhow::bail!("{} is not {}", name, status);
            }
            println!("{} is {}", name, status);
        }
    }
    Ok(())
}

async fn run_podman(provisioner: &Provisioner, action: PodmanAction) -> anyhow::Result<()> {
    let podman = provisioner.podman();
    match action {
        PodmanAction::Fix => {
            podman.fix_service_file().await?;
        }
        PodmanAction::Registry => {
            podman.configure_registry_mirror()?;
        }
        PodmanAction::Socket => println!("unix://{}", podman.socket_path()?.display()),
        PodmanAction::Start => {
            let socket = podman.start().await?;
            println!("unix://{}", socket.display());
        }
        PodmanAction::ComposeUp { dir } => podman.compose_up(&dir).await?,
        PodmanAction::ComposeDown { dir } => podman.compose_down(&dir).await?,
    }
    Ok(())
}

async fn serve(config: &ProvisionConfig, provisioner: &Provisioner, cancel: CancellationToken) -> anyhow::Result<()> {
    info!("Starting brewstrap agent v{}", env!("CARGO_PKG_VERSION"));

    // Create application state
    let state = Arc::new(AppState::new(
        &config.agent,
        Arc::clone(provisioner.homebrew()),
        cancel,
    ));

    // Start the keep-alive background task
    let keep_alive_state = Arc::clone(&state);
    let keep_alive = tokio::spawn(async move {
        keep_alive_task(keep_alive_state).await;
    });

    // Create HTTP router with all endpoints
    let app = create_router(Arc::clone(&state));

    // Bind to the specified address
    let addr = config.agent.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Agent running on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /services             - List services");
    info!("  POST /services/:name/start - Start a service");
    info!("  POST /services/:name/stop  - Stop a service");
    info!("  GET  /status               - Agent status");
    info!("  GET  /health               - Health check");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    state.shutdown();
    if let Err(e) = keep_alive.await {
        tracing::warn!("Keep-alive task ended abnormally: {}", e);
    }

    info!("Agent shutdown complete");
    Ok(())
}
