//! Serve a virtual terminal over a byte stream
//!
//! The bridge speaks the line protocol on one side (command lines in,
//! response lines out) and envelopes on the other, so anything that can
//! drive a serial terminal can drive the simulator instead. Pair it with
//! `tokio::io::duplex` in tests or a pseudo-terminal for manual runs.

use pos_protocol::{
    EncodeCommand, LineCodec, ResponseFrame, ResponseStatus, SimulatorCommand, TerminalCommand,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::SimError;
use crate::task::{spawn_virtual_terminal, TerminalHandle, TerminalLink};
use crate::terminal::TerminalConfig;

/// Pump lines between `stream` and a virtual terminal until either ends
///
/// Unreadable command lines are answered with an `ERROR` frame carrying
/// `INVALID_COMMAND` rather than forwarded.
pub async fn bridge_wire<S>(mut stream: S, link: TerminalLink) -> Result<(), SimError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let TerminalLink {
        command_tx,
        mut response_rx,
    } = link;
    let mut codec = LineCodec::new();
    let mut buf = [0u8; 1024];

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                let n = result?;
                if n == 0 {
                    debug!("Wire bridge stream closed");
                    break;
                }
                codec.push_bytes(&buf[..n]);
                while let Some(line) = codec.next_line() {
                    let text = String::from_utf8_lossy(&line);
                    match TerminalCommand::parse(&text) {
                        Ok(command) => {
                            debug!("Wire bridge received {}", command);
                            if command_tx.send(SimulatorCommand::from_command(&command)).await.is_err() {
                                info!("Virtual terminal gone, closing wire bridge");
                                return Ok(());
                            }
                        }
                        Err(e) => {
                            warn!("Wire bridge rejecting {:?}: {}", text, e);
                            let mut frame = ResponseFrame::new(ResponseStatus::Error, "Invalid command");
                            frame.error = Some("INVALID_COMMAND".to_string());
                            stream.write_all(&frame.encode()).await?;
                            stream.flush().await?;
                        }
                    }
                }
            }

            response = response_rx.recv() => {
                let Some(response) = response else {
                    info!("Virtual terminal closed, closing wire bridge");
                    break;
                };
                let data = response.to_frame().encode();
                debug!("Wire bridge sending {:?}", String::from_utf8_lossy(&data));
                stream.write_all(&data).await?;
                stream.flush().await?;
            }
        }
    }

    Ok(())
}

/// Spawn a virtual terminal served over `stream`
///
/// The stream is shut down when the terminal closes, which the peer sees
/// as end of file.
pub fn serve_wire<S>(stream: S, config: TerminalConfig) -> TerminalHandle
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (link, handle) = spawn_virtual_terminal(config);
    tokio::spawn(async move {
        if let Err(e) = bridge_wire(stream, link).await {
            warn!("Wire bridge ended with error: {}", e);
        }
    });
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::OperatorAction;
    use crate::terminal::AutoRespond;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn test_sale_line_answered_with_response_line() {
        let (host, device) = duplex(1024);
        let config = TerminalConfig {
            auto_respond: Some(AutoRespond {
                action: OperatorAction::Cancel,
                delay_ms: 0,
            }),
            ..Default::default()
        };
        let handle = serve_wire(device, config);

        let (read_half, mut write_half) = tokio::io::split(host);
        write_half.write_all(b"SALE|5000|1\r\n").await.unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let frame = ResponseFrame::parse(&line).unwrap();
        assert_eq!(frame.status, ResponseStatus::Cancelled);
        assert_eq!(frame.error.as_deref(), Some("USER_CANCELLED"));

        handle.close().await;
    }

    #[tokio::test]
    async fn test_garbage_line_gets_error_frame() {
        let (host, device) = duplex(1024);
        let handle = serve_wire(device, TerminalConfig::default());

        let (read_half, mut write_half) = tokio::io::split(host);
        write_half.write_all(b"HELLO\r\nTEST\r\n").await.unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let first = ResponseFrame::parse(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first.error.as_deref(), Some("INVALID_COMMAND"));
        let second = ResponseFrame::parse(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(second.status, ResponseStatus::Success);

        handle.close().await;
    }
}
