//! Async line I/O for terminal connections
//!
//! This module provides non-blocking serial communication using
//! tokio_serial. Each connection runs in its own spawned task, talking to
//! the coordinator via channels:
//!
//! - writes arrive as [`WriteRequest`]s and are acknowledged once flushed
//! - reads are split into lines and forwarded as
//!   [`CoordinatorCommand::LineReceived`], in order
//! - end of stream or a read error is reported as
//!   [`CoordinatorCommand::ChannelClosed`]
//!
//! The connection is generic over the I/O type, so a `DuplexStream` from
//! `tokio::io::duplex()` can stand in for a serial port.

use std::io::ErrorKind;
use std::time::Duration;

use pos_protocol::LineCodec;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info, warn};

use crate::coordinator::CoordinatorCommand;
use crate::state::ChannelId;

/// Any byte stream a terminal can be attached through
pub trait LineIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> LineIo for T {}

/// Boxed byte stream handed to the coordinator
pub struct LineStream(pub Box<dyn LineIo>);

impl LineStream {
    pub fn new(io: impl LineIo + 'static) -> Self {
        Self(Box::new(io))
    }
}

impl std::fmt::Debug for LineStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LineStream").field(&"<stream>").finish()
    }
}

/// A line to write, with a reply once it has been flushed
#[derive(Debug)]
pub struct WriteRequest {
    pub data: Vec<u8>,
    pub done: oneshot::Sender<Result<(), String>>,
}

/// Async terminal connection that runs in a spawned task
pub struct LineConnection<T> {
    channel: ChannelId,
    port_name: String,
    io: T,
    codec: LineCodec,
    coord_tx: mpsc::Sender<CoordinatorCommand>,
    buffer: Vec<u8>,
}

impl LineConnection<SerialStream> {
    /// Open a serial port at 8 data bits, no parity, 1 stop bit
    pub fn open(
        channel: ChannelId,
        port_name: &str,
        baud_rate: u32,
        coord_tx: mpsc::Sender<CoordinatorCommand>,
    ) -> Result<Self, tokio_serial::Error> {
        let stream = tokio_serial::new(port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open_native_async()?;

        info!("Opened {} at {} baud (8N1)", port_name, baud_rate);
        Ok(Self::new(channel, port_name.to_string(), stream, coord_tx))
    }
}

impl<T> LineConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a connection over a custom I/O type
    pub fn new(
        channel: ChannelId,
        name: String,
        io: T,
        coord_tx: mpsc::Sender<CoordinatorCommand>,
    ) -> Self {
        Self {
            channel,
            port_name: name,
            io,
            codec: LineCodec::new(),
            coord_tx,
            buffer: vec![0u8; 1024],
        }
    }

    /// Main loop - runs until the stream ends, fails, or shutdown is requested
    ///
    /// Reading and writing are separate futures over split halves, so a
    /// reader waiting on a full coordinator queue never holds up a write.
    /// A requested shutdown exits quietly. Any other exit reports
    /// `ChannelClosed` so the coordinator can fail whatever is pending.
    pub async fn run(
        self,
        write_rx: mpsc::Receiver<WriteRequest>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let Self {
            channel,
            port_name,
            io,
            mut codec,
            coord_tx,
            mut buffer,
        } = self;
        info!(
            "Starting line loop for channel {} on {}",
            channel.0, port_name
        );

        let (mut reader, mut writer) = tokio::io::split(io);
        let writes = write_loop(&port_name, &mut writer, write_rx);
        let reads = async {
            loop {
                match reader.read(&mut buffer).await {
                    Ok(0) => return Some("end of stream".to_string()),
                    Ok(n) => {
                        codec.push_bytes(&buffer[..n]);
                        while let Some(line) = codec.next_line() {
                            debug!("Line from {}: {:?}", port_name, String::from_utf8_lossy(&line));
                            let cmd = CoordinatorCommand::LineReceived { channel, line };
                            if coord_tx.send(cmd).await.is_err() {
                                debug!("Coordinator gone, stopping channel {}", channel.0);
                                return None;
                            }
                        }
                    }
                    Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                    Err(e) => {
                        warn!("Read error on {}: {}", port_name, e);
                        return Some(format!("read error: {}", e));
                    }
                }
            }
        };

        let reason = tokio::select! {
            _ = &mut shutdown_rx => {
                info!("Shutdown requested for channel {}", channel.0);
                return;
            }

            _ = writes => {
                debug!("Write queue closed for channel {}", channel.0);
                return;
            }

            reason = reads => match reason {
                Some(reason) => reason,
                None => return,
            },
        };

        info!("Line loop ended for channel {}: {}", channel.0, reason);
        let _ = coord_tx
            .send(CoordinatorCommand::ChannelClosed { channel, reason })
            .await;
    }
}

/// Write queued lines until the queue closes
///
/// A request whose sender has stopped waiting is dropped unwritten; the
/// coordinator has already failed it.
async fn write_loop<W: AsyncWrite + Unpin>(
    port_name: &str,
    writer: &mut W,
    mut write_rx: mpsc::Receiver<WriteRequest>,
) {
    while let Some(WriteRequest { data, done }) = write_rx.recv().await {
        if done.is_closed() {
            warn!(
                "Dropping abandoned write to {}: {:?}",
                port_name,
                String::from_utf8_lossy(&data)
            );
            continue;
        }
        debug!("Writing {} bytes to {}: {:?}", data.len(), port_name, String::from_utf8_lossy(&data));
        let result = write_line(writer, &data).await.map_err(|e| e.to_string());
        if let Err(ref e) = result {
            warn!("Write error on {}: {}", port_name, e);
        }
        let _ = done.send(result);
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> std::io::Result<()> {
    writer.write_all(data).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_forwarded_in_order() {
        let (mut peer, io) = tokio::io::duplex(256);
        let (coord_tx, mut coord_rx) = mpsc::channel(16);
        let (_write_tx, write_rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();

        let conn = LineConnection::new(ChannelId(7), "duplex".into(), io, coord_tx);
        tokio::spawn(conn.run(write_rx, shutdown_rx));

        peer.write_all(b"FIRST|a\r\nSEC").await.unwrap();
        peer.write_all(b"OND|b\r\n").await.unwrap();

        for expected in [&b"FIRST|a"[..], &b"SECOND|b"[..]] {
            match coord_rx.recv().await.unwrap() {
                CoordinatorCommand::LineReceived { channel, line } => {
                    assert_eq!(channel, ChannelId(7));
                    assert_eq!(line, expected);
                }
                other => panic!("unexpected command: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_write_is_acknowledged() {
        let (mut peer, io) = tokio::io::duplex(256);
        let (coord_tx, _coord_rx) = mpsc::channel(16);
        let (write_tx, write_rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();

        let conn = LineConnection::new(ChannelId(1), "duplex".into(), io, coord_tx);
        tokio::spawn(conn.run(write_rx, shutdown_rx));

        let (done, done_rx) = oneshot::channel();
        write_tx
            .send(WriteRequest {
                data: b"TEST\r\n".to_vec(),
                done,
            })
            .await
            .unwrap();
        assert_eq!(done_rx.await.unwrap(), Ok(()));

        let mut buf = [0u8; 6];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"TEST\r\n");
    }

    #[tokio::test]
    async fn test_write_not_held_up_by_full_coordinator_queue() {
        let (mut peer, io) = tokio::io::duplex(4096);
        // Nobody drains the coordinator queue
        let (coord_tx, _coord_rx) = mpsc::channel(1);
        let (write_tx, write_rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();

        let conn = LineConnection::new(ChannelId(1), "duplex".into(), io, coord_tx);
        tokio::spawn(conn.run(write_rx, shutdown_rx));

        for _ in 0..50 {
            peer.write_all(b"ERROR|idle\r\n").await.unwrap();
        }
        tokio::task::yield_now().await;

        let (done, done_rx) = oneshot::channel();
        write_tx
            .send(WriteRequest {
                data: b"SALE|5000|1\r\n".to_vec(),
                done,
            })
            .await
            .unwrap();
        let ack = tokio::time::timeout(Duration::from_secs(1), done_rx).await;
        assert_eq!(ack.unwrap().unwrap(), Ok(()));

        let mut buf = [0u8; 13];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"SALE|5000|1\r\n");
    }

    #[tokio::test]
    async fn test_abandoned_write_is_dropped() {
        let (mut peer, io) = tokio::io::duplex(256);
        let (coord_tx, _coord_rx) = mpsc::channel(16);
        let (write_tx, write_rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();

        let (stale, stale_rx) = oneshot::channel();
        drop(stale_rx);
        write_tx
            .send(WriteRequest {
                data: b"SALE|5000|1\r\n".to_vec(),
                done: stale,
            })
            .await
            .unwrap();
        let (done, done_rx) = oneshot::channel();
        write_tx
            .send(WriteRequest {
                data: b"TEST\r\n".to_vec(),
                done,
            })
            .await
            .unwrap();

        let conn = LineConnection::new(ChannelId(2), "duplex".into(), io, coord_tx);
        tokio::spawn(conn.run(write_rx, shutdown_rx));
        assert_eq!(done_rx.await.unwrap(), Ok(()));

        let mut buf = [0u8; 6];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"TEST\r\n");
    }

    #[tokio::test]
    async fn test_peer_close_reported() {
        let (peer, io) = tokio::io::duplex(64);
        let (coord_tx, mut coord_rx) = mpsc::channel(16);
        let (_write_tx, write_rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();

        let conn = LineConnection::new(ChannelId(3), "duplex".into(), io, coord_tx);
        let task = tokio::spawn(conn.run(write_rx, shutdown_rx));
        drop(peer);

        match coord_rx.recv().await.unwrap() {
            CoordinatorCommand::ChannelClosed { channel, .. } => assert_eq!(channel, ChannelId(3)),
            other => panic!("unexpected command: {:?}", other),
        }
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_requested_shutdown_is_quiet() {
        let (_peer, io) = tokio::io::duplex(64);
        let (coord_tx, mut coord_rx) = mpsc::channel(16);
        let (_write_tx, write_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let conn = LineConnection::new(ChannelId(4), "duplex".into(), io, coord_tx);
        let task = tokio::spawn(conn.run(write_rx, shutdown_rx));
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();

        assert!(coord_rx.recv().await.is_none());
    }
}
