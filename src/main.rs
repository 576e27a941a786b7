#![deny(clippy::unwrap_used)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use crossterm::style::Stylize;
use dotenv::dotenv;
use tracing::{error, info};

use ssh_fanout::fanout::auth::{CredentialResolver, TerminalPrompt};
use ssh_fanout::fanout::{
    Dispatcher, FanoutError, HostKeyPolicy, ResultSink, RunSettings, RunSummary, SshConnector,
    inventory,
};

/// Run command batches on many SSH hosts concurrently.
#[derive(Debug, Parser)]
#[command(name = "ssh-fanout", version, about)]
struct Cli {
    /// Inventory file listing servers and their commands
    #[arg(short = 'f', long = "file", value_name = "PATH", default_value = "servers.yaml")]
    file: PathBuf,

    /// Also write every command's output to this file (truncated at start)
    #[arg(short = 'l', long = "log", value_name = "PATH")]
    log: Option<PathBuf>,

    /// Only run on the server whose host matches exactly
    #[arg(long, value_name = "NAME")]
    host: Option<String>,

    /// Accept any host key without verification
    #[arg(long, conflicts_with = "known_hosts")]
    insecure: bool,

    /// known_hosts file to verify host keys against [default: ~/.ssh/known_hosts]
    #[arg(long, value_name = "PATH")]
    known_hosts: Option<PathBuf>,

    /// Hosts processed at the same time [env: SSH_MAX_CONCURRENCY, default: 32]
    #[arg(long, value_name = "N")]
    max_concurrency: Option<usize>,

    /// Connection timeout per attempt in seconds [env: SSH_CONNECT_TIMEOUT, default: 30]
    #[arg(long, value_name = "SECS")]
    connect_timeout: Option<u64>,

    /// Per-command timeout in seconds, 0 disables [env: SSH_COMMAND_TIMEOUT]
    #[arg(long, value_name = "SECS")]
    command_timeout: Option<u64>,

    /// Disable coloured console output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    // stdout carries command output, diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    let colored = !cli.no_color;

    match run(cli).await {
        Ok(summary) => {
            print_summary(&summary, colored);
            exit_code(&summary)
        }
        Err(e) => {
            error!(scope = %e.scope(), "{}", e);
            let message = format!("Error: {}", e);
            if colored {
                eprintln!("{}", message.red());
            } else {
                eprintln!("{}", message);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<RunSummary, FanoutError> {
    let hosts = inventory::load(&cli.file)?;
    let hosts = inventory::filter_hosts(hosts, cli.host.as_deref())?;

    let host_key_policy = if cli.insecure {
        HostKeyPolicy::AcceptAny
    } else {
        HostKeyPolicy::KnownHosts {
            path: cli.known_hosts,
        }
    };
    let settings = RunSettings::resolve(
        cli.connect_timeout,
        cli.command_timeout,
        cli.max_concurrency,
        host_key_policy,
    );
    info!(
        hosts = hosts.len(),
        max_concurrency = settings.max_concurrency,
        connect_timeout = ?settings.connect_timeout,
        "configuration loaded"
    );

    let sink = Arc::new(ResultSink::stdout(cli.log.as_deref(), !cli.no_color)?);
    let dispatcher = Dispatcher::new(
        SshConnector::new(&settings),
        CredentialResolver::new(TerminalPrompt),
        Arc::clone(&sink),
        settings.max_concurrency,
    );

    let cancel = dispatcher.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        println!("Received interrupt, shutting down...");
        cancel.cancel();

        // Running commands are allowed to finish; a second interrupt stops waiting
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Received second interrupt, exiting");
            std::process::exit(1);
        }
    });

    let summary = dispatcher.run(hosts).await;
    interrupt.abort();
    sink.close();

    Ok(summary)
}

/// Host and command failures are reported, not fatal; an interrupted run is.
fn exit_code(summary: &RunSummary) -> ExitCode {
    if summary.cancelled {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_summary(summary: &RunSummary, colored: bool) {
    println!(
        "Hosts: {} ({} failed), commands: {} succeeded, {} failed",
        summary.hosts,
        summary.hosts_failed,
        summary.commands_succeeded,
        summary.commands_failed
    );
    if summary.cancelled {
        println!("Run was interrupted before every host finished");
    }

    let done = "All operations completed";
    if colored {
        println!("{}", done.green());
    } else {
        println!("{}", done);
    }
}
