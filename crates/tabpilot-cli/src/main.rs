//! tabpilot CLI, daemon and page host entry point.

mod args;
mod daemon;
mod host;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tabpilot_core::interact::Action;
use tabpilot_core::protocol::{Command, InteractParams, NavigateParams, Request};
use tracing::{error, info};
use uuid::Uuid;

use crate::args::{Cli, Commands, TargetArgs};
use crate::daemon::server::SHUTDOWN_METHOD;
use crate::daemon::{DaemonClient, DaemonServer};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon(args) => run_daemon(Duration::from_millis(args.timeout)),
        Commands::Host(args) => {
            if let Err(e) = run_async(host::run_host(args.url)) {
                error!("Page host failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Commands::Examples => println!("{}", args::EXAMPLES_TEXT),
        command => {
            if let Err(e) = run_client_command(command) {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}

fn run_async<F: std::future::Future<Output = anyhow::Result<()>>>(future: F) -> anyhow::Result<()> {
    tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?
        .block_on(future)
}

fn interact(
    action: Action,
    target: TargetArgs,
    snapshot: bool,
    text: Option<String>,
    key: Option<String>,
    value: Option<String>,
) -> Command {
    Command::Interact(InteractParams {
        action,
        element: target.selector(),
        text,
        key,
        value,
        snapshot,
    })
}

/// Build the wire request for a client subcommand.
fn cli_to_request(command: Commands) -> Request {
    let id = Uuid::new_v4().to_string();
    let command = match command {
        Commands::Snapshot => Command::Snapshot,
        Commands::Navigate(args) => Command::Navigate(NavigateParams { url: args.url }),
        Commands::Click(args) => interact(Action::Click, args.target, args.snapshot, None, None, None),
        Commands::Hover(args) => interact(Action::Hover, args.target, args.snapshot, None, None, None),
        Commands::Type(args) => {
            interact(Action::Type, args.target, args.snapshot, Some(args.text), None, None)
        }
        Commands::Select(args) => {
            interact(Action::Select, args.target, args.snapshot, None, None, Some(args.value))
        }
        Commands::Press(args) => {
            interact(Action::Press, args.target, args.snapshot, None, Some(args.key), None)
        }
        Commands::Console => Command::Console,
        Commands::Stop => {
            return Request {
                id,
                method: SHUTDOWN_METHOD.to_string(),
                params: json!({}),
            }
        }
        Commands::Daemon(_) | Commands::Host(_) | Commands::Examples => {
            unreachable!("handled before connecting to the daemon")
        }
    };
    Request::new(id, command.method(), command.params())
}

/// Send one request to the daemon (auto-starting it) and print the result.
fn run_client_command(command: Commands) -> anyhow::Result<()> {
    let request = cli_to_request(command);

    run_async(async {
        let mut client = DaemonClient::connect().await?;
        let response = client.request(request).await?;

        match response.into_result() {
            Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
            Err(err) => {
                eprintln!("Error: {}", err);
                std::process::exit(1);
            }
        }
        Ok(())
    })
}

/// Run the daemon until it is stopped, goes idle, or receives SIGINT/SIGTERM.
///
/// Socket and PID files are removed when the server is dropped.
fn run_daemon(call_timeout: Duration) {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    runtime.block_on(async {
        let server = match DaemonServer::bind(call_timeout).await {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to start daemon: {:#}", e);
                std::process::exit(1);
            }
        };

        tokio::select! {
            result = server.run() => {
                if let Err(e) = result {
                    error!("Daemon error: {:#}", e);
                    std::process::exit(1);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down gracefully");
            }
            _ = sigterm() => {
                info!("Received SIGTERM, shutting down gracefully");
            }
        }
    });
}

/// Wait for SIGTERM. If the handler cannot be registered, wait forever.
#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(
                "Failed to register SIGTERM handler: {}, daemon will only respond to SIGINT",
                e
            );
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}
