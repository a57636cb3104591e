use serialport::{SerialPort, SerialPortInfo};
use std::io::{self, Read, Write};
use std::time::Duration;

/// One open byte-stream connection.
///
/// `read` must return within a short timeout; `Ok(0)`, `TimedOut` and
/// `WouldBlock` all mean "nothing available yet".
pub trait SerialConnection: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
    /// A second handle to the same connection, used by the read loop.
    fn try_clone(&self) -> io::Result<Box<dyn SerialConnection>>;
}

/// Opens connections by address.
pub trait Connector: Send + Sync {
    fn open(&self, address: &str, baud_rate: u32) -> io::Result<Box<dyn SerialConnection>>;
}

/// Real serial devices, 8N1 without flow control.
#[derive(Debug, Clone)]
pub struct SerialPortConnector {
    read_timeout: Duration,
}

impl Default for SerialPortConnector {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(50),
        }
    }
}

impl Connector for SerialPortConnector {
    fn open(&self, address: &str, baud_rate: u32) -> io::Result<Box<dyn SerialConnection>> {
        let port = serialport::new(address, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.read_timeout)
            .open()?;
        Ok(Box::new(PortConnection(port)))
    }
}

struct PortConnection(Box<dyn SerialPort>);

impl SerialConnection for PortConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.write_all(bytes)?;
        self.0.flush()
    }

    fn try_clone(&self) -> io::Result<Box<dyn SerialConnection>> {
        let port = self.0.try_clone()?;
        Ok(Box::new(PortConnection(port)))
    }
}

#[derive(Debug, Clone)]
pub struct PortInfo {
    pub port_name: String,
    pub port_type: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (port_type, vid, pid, manufacturer, product) = match info.port_type {
            serialport::SerialPortType::UsbPort(usb) => (
                "USB",
                Some(usb.vid),
                Some(usb.pid),
                usb.manufacturer,
                usb.product,
            ),
            serialport::SerialPortType::PciPort => ("PCI", None, None, None, None),
            serialport::SerialPortType::BluetoothPort => ("Bluetooth", None, None, None, None),
            serialport::SerialPortType::Unknown => ("Unknown", None, None, None, None),
        };
        Self {
            port_name: info.port_name,
            port_type: port_type.to_string(),
            vid,
            pid,
            manufacturer,
            product,
        }
    }
}

impl PortInfo {
    /// `/dev/ttyACM0 (2E8A:000A)` for USB devices, the bare name otherwise.
    pub fn label(&self) -> String {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => format!("{} ({vid:04X}:{pid:04X})", self.port_name),
            _ => self.port_name.clone(),
        }
    }
}

pub fn list_ports() -> Vec<PortInfo> {
    serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_label() {
        let mut info = PortInfo {
            port_name: "/dev/ttyACM0".into(),
            port_type: "USB".into(),
            vid: Some(0x2e8a),
            pid: Some(0x000a),
            manufacturer: None,
            product: None,
        };
        assert_eq!(info.label(), "/dev/ttyACM0 (2E8A:000A)");
        info.vid = None;
        assert_eq!(info.label(), "/dev/ttyACM0");
    }

    #[test]
    fn test_open_missing_device_fails() {
        let connector = SerialPortConnector::default();
        assert!(connector.open("/dev/uartlink-does-not-exist", 115_200).is_err());
    }
}
