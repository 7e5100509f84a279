//! Stdin operator surface for the virtual terminal
//!
//! Plays the part of the cashier: shows what the terminal displays and
//! turns typed lines into operator controls.

use std::io::BufRead;

use pos_sim::{
    CardBrand, OperatorAction, Scenario, TerminalControl, TerminalHandle, TerminalStateEvent,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

const HELP: &str = "commands: approve | decline | cancel | scenario <name> | card <name> | help";

/// Read stdin on a plain thread; tokio's stdin would block runtime shutdown
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Parse one typed line into a control
fn parse_line(line: &str) -> Result<Option<TerminalControl>, String> {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return Ok(None);
    };
    match first.to_ascii_lowercase().as_str() {
        "help" | "?" => Err(HELP.to_string()),
        "scenario" => {
            let name = words.next().unwrap_or_default();
            name.parse::<Scenario>()
                .map(|s| Some(TerminalControl::SetScenario(s)))
                .map_err(|e| format!("{e} (one of: {})", scenario_names()))
        }
        "card" => {
            let name = words.next().unwrap_or_default();
            name.parse::<CardBrand>()
                .map(|c| Some(TerminalControl::SetCard(c)))
                .map_err(|e| e.to_string())
        }
        other => other
            .parse::<OperatorAction>()
            .map(|a| Some(TerminalControl::Operator(a)))
            .map_err(|e| format!("{e}; {HELP}")),
    }
}

fn scenario_names() -> String {
    Scenario::ALL
        .iter()
        .map(Scenario::name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn show(event: &TerminalStateEvent) {
    match event {
        TerminalStateEvent::SurfaceReady => println!("[terminal] ready"),
        TerminalStateEvent::CommandQueued(cmd) => {
            println!("[terminal] {:?} queued until ready", cmd.command)
        }
        TerminalStateEvent::CommandDisplayed(cmd) => {
            println!(
                "[terminal] {} amount={} installments={} - approve, decline or cancel?",
                cmd.kind.unwrap_or_default(),
                cmd.amount.unwrap_or_default(),
                cmd.installment.unwrap_or(1)
            );
        }
        TerminalStateEvent::CommandRejected { reason } => println!("[terminal] rejected: {reason}"),
        TerminalStateEvent::ResponseSent(resp) => {
            println!("[terminal] sent {} {}", resp.status, resp.message)
        }
        TerminalStateEvent::Closed => println!("[terminal] closed"),
    }
}

/// Drive the terminal from stdin until it closes
pub async fn run_operator(handle: TerminalHandle) {
    let mut state = handle.subscribe();
    let mut input = spawn_stdin_reader();
    println!("{HELP}");

    loop {
        tokio::select! {
            event = state.recv() => match event {
                Ok(event) => {
                    show(&event);
                    if matches!(event, TerminalStateEvent::Closed) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("Operator surface skipped {} terminal events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            line = input.recv() => {
                let Some(line) = line else {
                    debug!("Stdin closed, closing operator surface");
                    break;
                };
                match parse_line(&line) {
                    Ok(Some(control)) => {
                        if let Err(e) = handle.control(control).await {
                            warn!("Operator control not delivered: {}", e);
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => println!("{message}"),
                }
            }
        }
    }

    handle.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        assert!(matches!(
            parse_line("approve"),
            Ok(Some(TerminalControl::Operator(OperatorAction::Approve)))
        ));
        assert!(matches!(
            parse_line("  D "),
            Ok(Some(TerminalControl::Operator(OperatorAction::Decline)))
        ));
        assert!(matches!(parse_line(""), Ok(None)));
    }

    #[test]
    fn test_parse_settings_lines() {
        assert!(matches!(
            parse_line("scenario pin_error"),
            Ok(Some(TerminalControl::SetScenario(Scenario::PinError)))
        ));
        assert!(matches!(
            parse_line("card amex"),
            Ok(Some(TerminalControl::SetCard(CardBrand::Amex)))
        ));
        let err = parse_line("scenario jackpot").unwrap_err();
        assert!(err.contains("invalid_card"));
    }
}
