//! Payment Terminal Station
//!
//! A command-line station for driving a payment terminal: list serial
//! ports, run a sale or refund, or probe the terminal. With `--simulator`
//! the built-in virtual terminal stands in for hardware.

mod operator;
mod settings;

use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pos_link::{spawn_coordinator, PosService, SimulatedLink, TerminalEvent};
use pos_protocol::TransactionInput;
use pos_sim::{spawn_virtual_terminal, CardBrand, Scenario, TerminalHandle};
use settings::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "posterm", author, version, about, long_about = None)]
struct Cli {
    /// Serial port of the terminal (overrides settings)
    #[arg(long, short, env = "POSTERM_PORT", global = true)]
    port: Option<String>,

    /// Baud rate (overrides settings)
    #[arg(long, short, global = true)]
    baud: Option<u32>,

    /// Use the built-in virtual terminal instead of a serial port
    #[arg(long, global = true)]
    simulator: bool,

    /// Scenario the virtual terminal plays on approve
    #[arg(long, global = true)]
    scenario: Option<Scenario>,

    /// Card the virtual terminal reads
    #[arg(long, global = true)]
    card: Option<CardBrand>,

    /// Act as the cashier on stdin instead of auto-responding
    #[arg(long, short, global = true)]
    interactive: bool,

    /// Print coordinator events while running
    #[arg(long, global = true)]
    trace_events: bool,

    /// Persist the port and baud rate given on this run
    #[arg(long, global = true)]
    save: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports a terminal could be attached to
    Ports,

    /// Run a payment
    Pay {
        /// Amount in minor currency units
        amount: i64,

        /// sale or refund
        #[arg(long, short, default_value = "sale")]
        kind: String,

        /// Number of installments (1-12)
        #[arg(long, default_value_t = 1)]
        installments: i64,
    },

    /// Check that the terminal responds
    Health,
}

/// Open the channel the command line asks for
///
/// The returned handle keeps a non-interactive virtual terminal alive.
async fn attach(
    service: &PosService,
    cli: &Cli,
    settings: &Settings,
) -> anyhow::Result<Option<TerminalHandle>> {
    if cli.simulator {
        let mut config = settings.simulator.clone();
        if let Some(scenario) = cli.scenario {
            config.scenario = scenario;
        }
        if let Some(card) = cli.card {
            config.card = card;
        }
        if cli.interactive {
            config.auto_respond = None;
        }

        let (link, handle) = spawn_virtual_terminal(config);
        let meta = service
            .open_simulator(SimulatedLink::new(link.command_tx, link.response_rx))
            .await?;
        tracing::info!("Using virtual terminal on {}", meta.port_name);

        if cli.interactive {
            tokio::spawn(operator::run_operator(handle));
            return Ok(None);
        }
        return Ok(Some(handle));
    }

    let Some(port) = cli.port.clone().or_else(|| settings.port.clone()) else {
        bail!("no terminal port configured; pass --port or --simulator");
    };
    service
        .connect(port.clone(), cli.baud)
        .await
        .with_context(|| format!("could not open terminal on {port}"))?;
    Ok(None)
}

fn print_events(service: &PosService) {
    let mut events = service.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                TerminalEvent::CommandSent { data, .. } => {
                    eprintln!(">> {}", String::from_utf8_lossy(&data).trim_end())
                }
                TerminalEvent::LineReceived { data, .. } => {
                    eprintln!("<< {}", String::from_utf8_lossy(&data))
                }
                other => eprintln!("-- {other:?}"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Include all our crates in the default filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "posterm=info,pos_protocol=info,pos_detect=info,pos_link=info,pos_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load();

    if cli.save {
        if let Some(port) = &cli.port {
            settings.port = Some(port.clone());
        }
        if let Some(baud) = cli.baud {
            settings.coordinator.baud_rate = baud;
        }
        let path = settings.save()?;
        tracing::info!("Settings saved to {}", path.display());
    }

    let (service, coordinator) = spawn_coordinator(settings.coordinator.clone());
    if cli.trace_events {
        print_events(&service);
    }

    let success = match &cli.command {
        Command::Ports => {
            let ports = service.list_transports()?;
            if ports.is_empty() {
                eprintln!("No serial ports found");
            }
            println!("{}", serde_json::to_string_pretty(&ports)?);
            true
        }

        Command::Pay {
            amount,
            kind,
            installments,
        } => {
            let _terminal = attach(&service, &cli, &settings).await?;
            let outcome = service
                .submit_input(TransactionInput {
                    amount: *amount,
                    kind: kind.clone(),
                    installments: *installments,
                })
                .await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            outcome.success
        }

        Command::Health => {
            let _terminal = attach(&service, &cli, &settings).await?;
            let outcome = service.health_check().await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            outcome.success
        }
    };

    service.shutdown().await;
    coordinator.await.context("coordinator task failed")?;

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
