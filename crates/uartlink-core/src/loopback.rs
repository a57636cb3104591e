//! In-memory virtual serial devices.
//!
//! Each address owns a receive queue. Bytes written to an address are queued
//! on the address it is routed to: itself by default, or its peer after
//! [`LoopbackConnector::connect`].

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::connection::{Connector, SerialConnection};

#[derive(Clone)]
pub struct LoopbackConnector {
    registry: Arc<Mutex<Registry>>,
    read_timeout: Duration,
}

#[derive(Default)]
struct Registry {
    devices: HashMap<String, Device>,
    routes: HashMap<String, String>,
    failing: HashSet<String>,
    read_faults: HashMap<String, usize>,
}

struct Device {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    handles: Arc<AtomicUsize>,
    written: Vec<u8>,
}

impl Registry {
    fn device(&mut self, address: &str) -> &mut Device {
        self.devices.entry(address.to_string()).or_insert_with(|| {
            let (tx, rx) = unbounded();
            Device {
                tx,
                rx,
                handles: Arc::new(AtomicUsize::new(0)),
                written: Vec::new(),
            }
        })
    }
}

impl Default for LoopbackConnector {
    fn default() -> Self {
        Self {
            registry: Arc::default(),
            read_timeout: Duration::from_millis(10),
        }
    }
}

impl LoopbackConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cross-wire two addresses like a null-modem cable.
    pub fn connect(&self, a: &str, b: &str) {
        let mut registry = self.registry.lock();
        registry.routes.insert(a.to_string(), b.to_string());
        registry.routes.insert(b.to_string(), a.to_string());
    }

    /// Make future opens of `address` fail.
    pub fn fail_open(&self, address: &str) {
        self.registry.lock().failing.insert(address.to_string());
    }

    /// Make the next `count` reads on `address` fail with an I/O error.
    pub fn fail_reads(&self, address: &str, count: usize) {
        *self
            .registry
            .lock()
            .read_faults
            .entry(address.to_string())
            .or_default() += count;
    }

    /// Queue bytes as if a remote peer had sent them to `address`.
    pub fn inject(&self, address: &str, bytes: &[u8]) {
        let mut registry = self.registry.lock();
        let _ = registry.device(address).tx.send(bytes.to_vec());
    }

    /// Everything written through connections to `address` so far.
    pub fn written(&self, address: &str) -> Vec<u8> {
        self.registry
            .lock()
            .devices
            .get(address)
            .map(|device| device.written.clone())
            .unwrap_or_default()
    }

    /// Live connection handles for `address`, clones included.
    pub fn open_handles(&self, address: &str) -> usize {
        self.registry
            .lock()
            .devices
            .get(address)
            .map(|device| device.handles.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

impl Connector for LoopbackConnector {
    fn open(&self, address: &str, _baud_rate: u32) -> io::Result<Box<dyn SerialConnection>> {
        let mut registry = self.registry.lock();
        if registry.failing.contains(address) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such device: {address}"),
            ));
        }
        let device = registry.device(address);
        Ok(Box::new(LoopbackConnection::new(
            address.to_string(),
            Arc::clone(&self.registry),
            device.rx.clone(),
            Arc::clone(&device.handles),
            self.read_timeout,
        )))
    }
}

struct LoopbackConnection {
    address: String,
    registry: Arc<Mutex<Registry>>,
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    handles: Arc<AtomicUsize>,
    read_timeout: Duration,
}

impl LoopbackConnection {
    fn new(
        address: String,
        registry: Arc<Mutex<Registry>>,
        rx: Receiver<Vec<u8>>,
        handles: Arc<AtomicUsize>,
        read_timeout: Duration,
    ) -> Self {
        handles.fetch_add(1, Ordering::SeqCst);
        Self {
            address,
            registry,
            rx,
            pending: Vec::new(),
            handles,
            read_timeout,
        }
    }
}

impl SerialConnection for LoopbackConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(faults) = self.registry.lock().read_faults.get_mut(&self.address) {
            if *faults > 0 {
                *faults -= 1;
                return Err(io::Error::new(io::ErrorKind::Other, "injected read fault"));
            }
        }
        if self.pending.is_empty() {
            match self.rx.recv_timeout(self.read_timeout) {
                Ok(bytes) => self.pending = bytes,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return Ok(0)
                }
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut registry = self.registry.lock();
        let target = registry
            .routes
            .get(&self.address)
            .cloned()
            .unwrap_or_else(|| self.address.clone());
        registry.device(&self.address).written.extend_from_slice(bytes);
        registry
            .device(&target)
            .tx
            .send(bytes.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "loopback queue closed"))
    }

    fn try_clone(&self) -> io::Result<Box<dyn SerialConnection>> {
        Ok(Box::new(LoopbackConnection::new(
            self.address.clone(),
            Arc::clone(&self.registry),
            self.rx.clone(),
            Arc::clone(&self.handles),
            self.read_timeout,
        )))
    }
}

impl Drop for LoopbackConnection {
    fn drop(&mut self) {
        self.handles.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_some(conn: &mut Box<dyn SerialConnection>) -> Vec<u8> {
        let mut buf = [0u8; 64];
        let n = conn.read(&mut buf).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn test_echo_on_same_address() {
        let connector = LoopbackConnector::new();
        let mut conn = connector.open("/dev/a", 9600).unwrap();
        conn.write_all(b"ping").unwrap();
        assert_eq!(read_some(&mut conn), b"ping");
        assert_eq!(connector.written("/dev/a"), b"ping");
    }

    #[test]
    fn test_connected_pair() {
        let connector = LoopbackConnector::new();
        connector.connect("/dev/a", "/dev/b");
        let mut a = connector.open("/dev/a", 9600).unwrap();
        let mut b = connector.open("/dev/b", 9600).unwrap();
        a.write_all(b"to b").unwrap();
        assert_eq!(read_some(&mut b), b"to b");
        assert!(read_some(&mut a).is_empty());
    }

    #[test]
    fn test_read_splits_large_chunk() {
        let connector = LoopbackConnector::new();
        let mut conn = connector.open("/dev/a", 9600).unwrap();
        connector.inject("/dev/a", &[7u8; 100]);
        assert_eq!(read_some(&mut conn).len(), 64);
        assert_eq!(read_some(&mut conn).len(), 36);
    }

    #[test]
    fn test_read_faults() {
        let connector = LoopbackConnector::new();
        let mut conn = connector.open("/dev/a", 9600).unwrap();
        connector.inject("/dev/a", b"after");
        connector.fail_reads("/dev/a", 2);

        let mut buf = [0u8; 16];
        assert_eq!(conn.read(&mut buf).unwrap_err().kind(), io::ErrorKind::Other);
        assert_eq!(conn.read(&mut buf).unwrap_err().kind(), io::ErrorKind::Other);
        assert_eq!(read_some(&mut conn), b"after");
    }

    #[test]
    fn test_handles_and_failures() {
        let connector = LoopbackConnector::new();
        let conn = connector.open("/dev/a", 9600).unwrap();
        let clone = conn.try_clone().unwrap();
        assert_eq!(connector.open_handles("/dev/a"), 2);
        drop(conn);
        drop(clone);
        assert_eq!(connector.open_handles("/dev/a"), 0);

        connector.fail_open("/dev/gone");
        let err = connector.open("/dev/gone", 9600).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
