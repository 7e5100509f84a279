//! Terminal channel types
//!
//! A [`Channel`] is the single open path to a terminal. It comes in two
//! variants with the same contract:
//!
//! - **Serial**: a [`LineConnection`] task owning a serial port (or any
//!   byte stream), written to via [`WriteRequest`]s
//! - **Simulated**: an in-process [`SimulatedLink`] carrying envelope
//!   objects to and from a simulated terminal
//!
//! Both report inbound responses to the coordinator as lines, so the
//! coordinator never needs to know which one it is talking to.

use pos_protocol::{EncodeCommand, SimulatorCommand, SimulatorResponse, TerminalCommand};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::connection::{LineConnection, LineStream, WriteRequest};
use crate::coordinator::CoordinatorCommand;
use crate::error::LinkError;
use crate::state::ChannelId;

/// Port name reported for the simulated terminal
pub const VIRTUAL_PORT: &str = "COM_VIRTUAL_POS";

/// Type of terminal connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Hardware terminal on a serial port (or a stream standing in for one)
    Serial,
    /// In-process simulated terminal
    Simulated,
}

/// Metadata for an open channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMeta {
    pub id: ChannelId,
    pub kind: ChannelKind,
    /// Serial port path, stream name, or [`VIRTUAL_PORT`]
    pub port_name: String,
    /// Baud rate (serial ports only)
    pub baud_rate: Option<u32>,
}

impl ChannelMeta {
    /// Check if this is the simulated terminal
    pub fn is_simulated(&self) -> bool {
        self.kind == ChannelKind::Simulated
    }
}

/// Bidirectional link to a simulated terminal
///
/// The coordinator sends commands through `command_tx` and receives
/// responses through `response_rx`. The simulator closing its end of
/// `response_rx` is treated as a disconnect.
pub struct SimulatedLink {
    pub command_tx: mpsc::Sender<SimulatorCommand>,
    pub response_rx: mpsc::Receiver<SimulatorResponse>,
}

impl std::fmt::Debug for SimulatedLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedLink")
            .field("command_tx", &"<sender>")
            .field("response_rx", &"<receiver>")
            .finish()
    }
}

impl SimulatedLink {
    pub fn new(
        command_tx: mpsc::Sender<SimulatorCommand>,
        response_rx: mpsc::Receiver<SimulatorResponse>,
    ) -> Self {
        Self {
            command_tx,
            response_rx,
        }
    }
}

/// Serial (or stream) channel backed by a [`LineConnection`] task
pub struct SerialChannel {
    meta: ChannelMeta,
    write_tx: mpsc::Sender<WriteRequest>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

/// Simulated channel backed by a response forwarding task
pub struct SimulatedChannel {
    meta: ChannelMeta,
    command_tx: mpsc::Sender<SimulatorCommand>,
    forward_task: JoinHandle<()>,
}

/// The open path to a terminal
pub enum Channel {
    Serial(SerialChannel),
    Simulated(SimulatedChannel),
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("meta", self.meta())
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Open a hardware terminal on a serial port
    pub fn open_serial(
        id: ChannelId,
        port_name: &str,
        baud_rate: u32,
        coord_tx: mpsc::Sender<CoordinatorCommand>,
    ) -> Result<Self, LinkError> {
        let conn = LineConnection::open(id, port_name, baud_rate, coord_tx).map_err(|e| {
            LinkError::ConnectionFailed {
                port: port_name.to_string(),
                reason: e.to_string(),
            }
        })?;
        let meta = ChannelMeta {
            id,
            kind: ChannelKind::Serial,
            port_name: port_name.to_string(),
            baud_rate: Some(baud_rate),
        };
        Ok(Self::spawn_line_task(meta, conn))
    }

    /// Attach a terminal reachable through an arbitrary byte stream
    pub fn from_stream(
        id: ChannelId,
        name: String,
        stream: LineStream,
        coord_tx: mpsc::Sender<CoordinatorCommand>,
    ) -> Self {
        let meta = ChannelMeta {
            id,
            kind: ChannelKind::Serial,
            port_name: name.clone(),
            baud_rate: None,
        };
        let conn = LineConnection::new(id, name, stream.0, coord_tx);
        Self::spawn_line_task(meta, conn)
    }

    fn spawn_line_task<T>(meta: ChannelMeta, conn: LineConnection<T>) -> Self
    where
        T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let (write_tx, write_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(conn.run(write_rx, shutdown_rx));
        Channel::Serial(SerialChannel {
            meta,
            write_tx,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Attach a simulated terminal
    ///
    /// Each response is rendered into a response line and delivered to the
    /// coordinator exactly like a line read from a serial port.
    pub fn simulated(
        id: ChannelId,
        link: SimulatedLink,
        coord_tx: mpsc::Sender<CoordinatorCommand>,
    ) -> Self {
        let meta = ChannelMeta {
            id,
            kind: ChannelKind::Simulated,
            port_name: VIRTUAL_PORT.to_string(),
            baud_rate: None,
        };
        let SimulatedLink {
            command_tx,
            response_rx,
        } = link;
        let forward_task = tokio::spawn(forward_simulator_responses(id, response_rx, coord_tx));
        Channel::Simulated(SimulatedChannel {
            meta,
            command_tx,
            forward_task,
        })
    }

    pub fn id(&self) -> ChannelId {
        self.meta().id
    }

    pub fn meta(&self) -> &ChannelMeta {
        match self {
            Channel::Serial(c) => &c.meta,
            Channel::Simulated(c) => &c.meta,
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, Channel::Simulated(_))
    }

    /// Send one command, returning the bytes that represent it on the wire
    pub async fn send(&self, command: &TerminalCommand) -> Result<Vec<u8>, LinkError> {
        let data = command.encode();
        match self {
            Channel::Serial(c) => {
                let (done, done_rx) = oneshot::channel();
                c.write_tx
                    .send(WriteRequest {
                        data: data.clone(),
                        done,
                    })
                    .await
                    .map_err(|_| LinkError::WriteFailure("connection closed".into()))?;
                done_rx
                    .await
                    .map_err(|_| LinkError::WriteFailure("connection closed".into()))?
                    .map_err(LinkError::WriteFailure)?;
            }
            Channel::Simulated(c) => {
                c.command_tx
                    .send(SimulatorCommand::from_command(command))
                    .await
                    .map_err(|_| LinkError::WriteFailure("simulator closed".into()))?;
            }
        }
        Ok(data)
    }

    /// Release the transport
    ///
    /// The transport task stops without reporting a close back to the
    /// coordinator. Dropping the simulator command sender tells the
    /// simulated terminal to shut down.
    pub fn close(self) {
        match self {
            Channel::Serial(mut c) => {
                info!("Closing serial channel {} ({})", c.meta.id.0, c.meta.port_name);
                if let Some(tx) = c.shutdown_tx.take() {
                    let _ = tx.send(());
                }
            }
            Channel::Simulated(c) => {
                info!("Closing simulated channel {}", c.meta.id.0);
                c.forward_task.abort();
            }
        }
    }
}

/// Forward simulator responses to the coordinator as response lines
async fn forward_simulator_responses(
    channel: ChannelId,
    mut response_rx: mpsc::Receiver<SimulatorResponse>,
    coord_tx: mpsc::Sender<CoordinatorCommand>,
) {
    while let Some(response) = response_rx.recv().await {
        let line = response.to_frame().to_line().into_bytes();
        debug!(
            "Simulator response on channel {}: {}",
            channel.0,
            String::from_utf8_lossy(&line)
        );
        if coord_tx
            .send(CoordinatorCommand::LineReceived { channel, line })
            .await
            .is_err()
        {
            return;
        }
    }

    let _ = coord_tx
        .send(CoordinatorCommand::ChannelClosed {
            channel,
            reason: "simulator closed".to_string(),
        })
        .await;
}
