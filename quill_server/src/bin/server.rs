use anyhow::Context;
use clap::Parser;
use tracing_log_error::log_error;
use quill::web::server::{ServerHandle, ShutdownMode};
use quill::{build_application_state, run};
use quill_server::configuration::{ApplicationProfile, Config};
use quill_server::telemetry::{LogLevel, get_subscriber, init_telemetry};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "quill", version, about = "Serve the Quill blog")]
struct Cli {
    /// Log at `debug` level, ignoring `RUST_LOG`.
    #[arg(long)]
    debug: bool,
    /// The configuration profile to load.
    ///
    /// It takes precedence over the `APP_PROFILE` environment variable.
    #[arg(long)]
    profile: Option<ApplicationProfile>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.debug {
        LogLevel::Debug
    } else {
        LogLevel::FromEnv {
            default_directives: "info",
        }
    };
    let subscriber = get_subscriber(level, std::io::stdout);
    init_telemetry(subscriber)?;

    // We isolate all the server setup and launch logic in a separate function
    // in order to have a single choke point where we make sure to log fatal errors
    // that will cause the application to exit.
    if let Err(e) = _main(cli.profile).await {
        log_error!(*e, "The application is exiting due to an error");
        std::process::exit(1);
    }

    Ok(())
}

async fn _main(profile: Option<ApplicationProfile>) -> anyhow::Result<()> {
    // Load environment variables from a .env file, if it exists.
    let _ = dotenvy::dotenv();

    let config = match profile {
        Some(profile) => Config::load_profile(profile)?,
        None => Config::load(Some(ApplicationProfile::Dev))?,
    };
    let application_state = build_application_state(&config.app)
        .await
        .context("Failed to build the application state")?;

    let tcp_listener = config
        .server
        .listener()
        .await
        .context("Failed to bind the server TCP listener")?;
    let address = tcp_listener
        .local_addr()
        .context("The server TCP listener doesn't have a local socket address")?;

    tracing::info!("Starting to listen for incoming requests at {}", address);
    let server_handle = run(tcp_listener, application_state);
    graceful_shutdown(
        server_handle.clone(),
        config.server.graceful_shutdown_timeout,
    )
    .await;
    server_handle.await;
    Ok(())
}

/// Shut the server down, gracefully, when the process is asked to stop.
async fn graceful_shutdown(server_handle: ServerHandle, timeout: Duration) {
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutting down the server");
        server_handle
            .shutdown(ShutdownMode::Graceful { timeout })
            .await;
    });
}

/// Wait for either Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log_error!(e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log_error!(e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
