//! Serial link to the gate controller.
//!
//! The link runs two independent loops: a read loop that reassembles framed
//! JSON messages from the byte stream, and a write loop that drains the
//! outgoing queue one message at a time. Either loop stops on a hard I/O
//! error; the process never reconnects on its own — restoring the link is
//! left to supervision.

use crate::message::{FrameBuffer, Message, FRAME_DELIMITER};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_serial::SerialPortBuilderExt;

/// Bound on each direction's queue so a stalled consumer cannot grow memory
/// without limit.
pub const OUTGOING_QUEUE_DEPTH: usize = 256;
pub const INCOMING_QUEUE_DEPTH: usize = 256;

const READ_CHUNK_SIZE: usize = 1024;

/// Why the serial port could not be opened. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum SerialOpenError {
    #[error("serial port already in use: {0}")]
    Busy(String),
    #[error("serial port doesn't exist: {0}")]
    Missing(String),
    #[error("couldn't open serial port: {0}")]
    Other(String),
}

impl From<tokio_serial::Error> for SerialOpenError {
    fn from(e: tokio_serial::Error) -> Self {
        match e.kind {
            tokio_serial::ErrorKind::NoDevice => SerialOpenError::Missing(e.description),
            tokio_serial::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                SerialOpenError::Missing(e.description)
            }
            tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                SerialOpenError::Busy(e.description)
            }
            _ => SerialOpenError::Other(e.description),
        }
    }
}

/// Cloneable sender half of the link: enqueue a message toward the device.
#[derive(Clone)]
pub struct SerialHandle {
    outgoing: mpsc::Sender<Message>,
}

impl SerialHandle {
    pub(crate) fn new(outgoing: mpsc::Sender<Message>) -> Self {
        Self { outgoing }
    }

    /// Fire-and-forget enqueue. A full queue drops the message with a
    /// warning; there is no delivery acknowledgement.
    pub fn send(&self, message: Message) {
        match self.outgoing.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("serial outgoing queue full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("serial write loop stopped, dropping message");
            }
        }
    }
}

/// An opened, configured serial port, not yet running.
pub struct SerialLink {
    stream: tokio_serial::SerialStream,
}

impl SerialLink {
    /// Open and configure the port. Errors carry the reason (busy, missing,
    /// other) so startup can report it precisely.
    pub fn open(device: &str, baud_rate: u32) -> Result<Self, SerialOpenError> {
        let stream = tokio_serial::new(device, baud_rate).open_native_async()?;
        Ok(Self { stream })
    }

    /// Spawn the read and write loops and return immediately with the
    /// outgoing handle and the incoming message queue.
    pub fn start(self) -> (SerialHandle, mpsc::Receiver<Message>) {
        let (out_tx, out_rx) = mpsc::channel(OUTGOING_QUEUE_DEPTH);
        let (in_tx, in_rx) = mpsc::channel(INCOMING_QUEUE_DEPTH);
        let (reader, writer) = tokio::io::split(self.stream);
        tokio::spawn(read_loop(reader, in_tx));
        tokio::spawn(write_loop(writer, out_rx));
        (SerialHandle::new(out_tx), in_rx)
    }
}

/// Reassemble frames from the byte stream and push decoded messages onto the
/// incoming queue. Malformed frames are dropped; a hard read error stops
/// only this loop.
async fn read_loop<R: AsyncRead + Unpin>(mut reader: R, incoming: mpsc::Sender<Message>) {
    let mut frames = FrameBuffer::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                log::error!("serial port closed, stopping read loop");
                break;
            }
            Ok(n) => {
                frames.extend(&chunk[..n]);
                while let Some(frame) = frames.next_frame() {
                    match Message::decode_bytes(&frame) {
                        Ok(message) => {
                            if incoming.send(message).await.is_err() {
                                log::debug!("serial incoming queue closed, stopping read loop");
                                return;
                            }
                        }
                        Err(e) => log::warn!("dropping malformed serial frame: {}", e),
                    }
                }
            }
            Err(e) => {
                log::error!("serial read failed, stopping read loop: {}", e);
                break;
            }
        }
    }
}

/// Drain the outgoing queue one message at a time, each followed by the
/// frame delimiter. Waits on the queue instead of re-posting when idle. A
/// write error stops only this loop.
async fn write_loop<W: AsyncWrite + Unpin>(mut writer: W, mut outgoing: mpsc::Receiver<Message>) {
    while let Some(message) = outgoing.recv().await {
        let mut frame = message.encode().into_bytes();
        frame.push(FRAME_DELIMITER);
        if let Err(e) = writer.write_all(&frame).await {
            log::error!("serial write failed, stopping write loop: {}", e);
            break;
        }
    }
}
