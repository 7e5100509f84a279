//! Serial port scanner
//!
//! Lists the ports a terminal could be opened on, labelled with the USB
//! manufacturer where the OS reports one.

use serde::{Deserialize, Serialize};
use serialport::{available_ports, SerialPortType};
use tracing::{debug, info, warn};

use crate::error::DetectError;

/// Label used when a port reports no manufacturer
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Ports that never carry a terminal (macOS Bluetooth and debug consoles)
const SKIP_PATTERNS: &[&str] = &["Bluetooth", "debug"];

/// A transport a terminal can be opened on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportInfo {
    /// Locator passed to `open` (port path)
    pub identifier: String,
    /// Manufacturer, or "Unknown"
    pub label: String,
}

impl TransportInfo {
    fn from_port(name: String, port_type: &SerialPortType) -> Self {
        let manufacturer = match port_type {
            SerialPortType::UsbPort(usb) => usb.manufacturer.as_deref(),
            _ => None,
        };
        Self {
            identifier: name,
            label: manufacturer
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or(UNKNOWN_LABEL)
                .to_string(),
        }
    }
}

/// Serial port scanner
#[derive(Debug, Default)]
pub struct PortScanner;

impl PortScanner {
    pub fn new() -> Self {
        Self
    }

    /// Enumerate available ports, skipping ones that never carry a terminal
    pub fn enumerate(&self) -> Result<Vec<TransportInfo>, DetectError> {
        let ports = available_ports()?;
        let transports: Vec<_> = ports
            .into_iter()
            .filter(|p| !is_skipped(&p.port_name))
            .map(|p| TransportInfo::from_port(p.port_name, &p.port_type))
            .collect();

        info!("Found {} serial port(s)", transports.len());
        for t in &transports {
            debug!("  {} - {}", t.identifier, t.label);
        }
        Ok(transports)
    }

    /// List transports for display
    ///
    /// Enumeration failures are logged and reported as an empty list.
    pub fn list_transports(&self) -> Vec<TransportInfo> {
        self.enumerate().unwrap_or_else(|e| {
            warn!("Port enumeration failed: {}", e);
            Vec::new()
        })
    }
}

fn is_skipped(port: &str) -> bool {
    SKIP_PATTERNS.iter().any(|pattern| port.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn test_usb_port_label_uses_manufacturer() {
        let usb_info = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x067B,
            pid: 0x2303,
            serial_number: None,
            manufacturer: Some(" Prolific ".to_string()),
            product: Some("USB-Serial Controller".to_string()),
        });

        let transport = TransportInfo::from_port("/dev/ttyUSB0".to_string(), &usb_info);
        assert_eq!(transport.identifier, "/dev/ttyUSB0");
        assert_eq!(transport.label, "Prolific");
    }

    #[test]
    fn test_non_usb_port_is_unknown() {
        let transport = TransportInfo::from_port("COM1".to_string(), &SerialPortType::Unknown);
        assert_eq!(transport.label, UNKNOWN_LABEL);
    }

    #[test]
    fn test_skipped_ports() {
        assert!(is_skipped("/dev/cu.Bluetooth-Incoming-Port"));
        assert!(is_skipped("/dev/cu.debug-console"));
        assert!(!is_skipped("/dev/ttyUSB0"));
    }

    #[test]
    fn test_transport_info_json() {
        let t = TransportInfo {
            identifier: "COM3".into(),
            label: "FTDI".into(),
        };
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#"{"identifier":"COM3","label":"FTDI"}"#);
    }
}
