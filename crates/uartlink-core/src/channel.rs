use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::connection::{Connector, SerialConnection};
use crate::error::LinkError;

const READ_BUF_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Send,
    Receive,
    SendReceive,
}

/// Receives every non-empty chunk read from a channel.
pub type ChunkSink = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// One open serial connection plus its background read loop.
pub struct Channel {
    address: String,
    baud_rate: u32,
    role: Role,
    idle_delay: Duration,
    writer: Mutex<Option<Box<dyn SerialConnection>>>,
    running: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Channel {
    pub fn open(
        connector: &dyn Connector,
        address: &str,
        baud_rate: u32,
        role: Role,
    ) -> Result<Self, LinkError> {
        let connection = connector
            .open(address, baud_rate)
            .map_err(|source| LinkError::Open {
                address: address.to_string(),
                source,
            })?;
        log::info!("opened {address} at {baud_rate} baud as {role:?}");
        Ok(Self {
            address: address.to_string(),
            baud_rate,
            role,
            idle_delay: Duration::from_millis(10),
            writer: Mutex::new(Some(connection)),
            running: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
        })
    }

    /// Delay after an empty read before polling again.
    pub fn with_idle_delay(mut self, idle_delay: Duration) -> Self {
        self.idle_delay = idle_delay;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_open(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Spawn the read loop. Chunks go to `sink`, or are discarded without one.
    pub fn start(&self, sink: Option<ChunkSink>) -> Result<(), LinkError> {
        let mut reader = self.reader.lock();
        if reader.is_some() {
            return Ok(());
        }

        let connection = match self.writer.lock().as_ref() {
            Some(connection) => connection.try_clone(),
            None => {
                return Err(LinkError::ChannelClosed {
                    address: self.address.clone(),
                })
            }
        };
        let spawn_err = |source: io::Error| LinkError::Spawn {
            address: self.address.clone(),
            source,
        };
        let connection = connection.map_err(spawn_err)?;

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let address = self.address.clone();
        let idle_delay = self.idle_delay;
        let handle = thread::Builder::new()
            .name(format!("uartlink-rx {}", self.address))
            .spawn(move || read_loop(connection, running, sink, address, idle_delay))
            .map_err(spawn_err)?;
        *reader = Some(handle);
        Ok(())
    }

    /// Write all of `bytes`, blocking until the connection accepts them.
    pub fn write(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut writer = self.writer.lock();
        let connection = writer.as_mut().ok_or_else(|| LinkError::ChannelClosed {
            address: self.address.clone(),
        })?;
        connection
            .write_all(bytes)
            .map_err(|source| LinkError::Write {
                address: self.address.clone(),
                source,
            })
    }

    /// Stop the read loop and release the connection. Safe to call repeatedly.
    pub fn close(&self) {
        self.running.store(false, Ordering::SeqCst);
        let released = self.writer.lock().take().is_some();

        if let Some(handle) = self.reader.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::error!("read loop for {} panicked", self.address);
            }
        }
        if released {
            log::info!("closed {}", self.address);
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_loop(
    mut connection: Box<dyn SerialConnection>,
    running: Arc<AtomicBool>,
    sink: Option<ChunkSink>,
    address: String,
    idle_delay: Duration,
) {
    let mut buf = [0u8; READ_BUF_SIZE];
    while running.load(Ordering::SeqCst) {
        match connection.read(&mut buf) {
            Ok(n) if n > 0 => {
                log::trace!("{address}: read {n} bytes");
                if let Some(sink) = &sink {
                    sink(&buf[..n]);
                }
                continue;
            }
            Ok(_) => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
            Err(e) => log::trace!("{address}: read error ignored: {e}"),
        }
        thread::sleep(idle_delay);
    }
    log::debug!("{address}: read loop stopped");
}
