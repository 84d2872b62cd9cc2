use crate::fluorometer::Fluorometer;
use crate::serial_terminal::{JipTerminal, SessionTiming, BAUD_RATE};
use serialport::SerialPort;
use std::fs;

/// Ports whose name contains this are wireless virtual ports, never the device.
pub const BLUETOOTH_MARKER: &str = "Bluetooth";

#[derive(Debug, thiserror::Error)]
pub enum JipConnectorError {
    #[error("Unsupported platform: {platform}")]
    UnsupportedPlatform { platform: String },

    #[error("No USB devices found. Ensure Open-JIP is plugged in.")]
    NoDevicesFound,

    #[error("Port number {index} is not one of the {available} listed ports")]
    InvalidSelection { index: usize, available: usize },

    #[error("Failed to connect to Open-JIP fluorometer on {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
}

/// Host OS families with a known serial device naming scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
}

impl Platform {
    /// Platform this binary was built for.
    pub fn current() -> Result<Self, JipConnectorError> {
        Self::from_os(std::env::consts::OS)
    }

    /// Accepts Rust's `std::env::consts::OS` names as well as the common
    /// `win32`/`cygwin`/`darwin` spellings.
    pub fn from_os(os: &str) -> Result<Self, JipConnectorError> {
        match os {
            "windows" | "win32" => Ok(Platform::Windows),
            "linux" | "cygwin" => Ok(Platform::Linux),
            "macos" | "darwin" => Ok(Platform::MacOs),
            other => Err(JipConnectorError::UnsupportedPlatform {
                platform: other.to_string(),
            }),
        }
    }

    /// Whether a `/dev` entry looks like a serial device on this platform.
    pub fn matches_device_name(&self, name: &str) -> bool {
        match self {
            Platform::Linux => name
                .strip_prefix("tty")
                .and_then(|rest| rest.chars().next())
                .is_some_and(|c| c.is_ascii_alphabetic()),
            Platform::MacOs => name.starts_with("tty."),
            Platform::Windows => false,
        }
    }
}

pub struct JipConnector;

impl JipConnector {
    /// Every serial device name the platform exposes, unfiltered.
    pub fn candidate_ports(platform: Platform) -> Result<Vec<String>, JipConnectorError> {
        let mut ports = match platform {
            Platform::Windows => serialport::available_ports()?
                .into_iter()
                .map(|info| info.port_name)
                .collect::<Vec<_>>(),
            Platform::Linux | Platform::MacOs => {
                let mut ports = Vec::new();
                for entry in fs::read_dir("/dev")? {
                    let name = entry?.file_name();
                    let name = name.to_string_lossy();
                    if platform.matches_device_name(&name) {
                        ports.push(format!("/dev/{name}"));
                    }
                }
                ports
            }
        };
        ports.sort();
        Ok(ports)
    }

    /// Drop Bluetooth virtual ports; fail if nothing is left.
    pub fn exclude_virtual_ports<I>(ports: I) -> Result<Vec<String>, JipConnectorError>
    where
        I: IntoIterator<Item = String>,
    {
        let ports: Vec<String> = ports
            .into_iter()
            .filter(|port| !port.contains(BLUETOOTH_MARKER))
            .collect();

        if ports.is_empty() {
            return Err(JipConnectorError::NoDevicesFound);
        }
        Ok(ports)
    }

    /// Ports the fluorometer may be attached to.
    pub fn available_ports(platform: Platform) -> Result<Vec<String>, JipConnectorError> {
        let ports = Self::exclude_virtual_ports(Self::candidate_ports(platform)?)?;
        log::debug!("Candidate ports: {:?}", ports);
        Ok(ports)
    }

    /// Pick one port. `choose` is only consulted when there is more than one.
    pub fn select_port<F>(candidates: &[String], choose: F) -> Result<&str, JipConnectorError>
    where
        F: FnOnce(&[String]) -> usize,
    {
        let index = match candidates.len() {
            0 => return Err(JipConnectorError::NoDevicesFound),
            1 => 0,
            _ => choose(candidates),
        };

        candidates
            .get(index)
            .map(String::as_str)
            .ok_or(JipConnectorError::InvalidSelection {
                index,
                available: candidates.len(),
            })
    }

    /// Open the serial connection to `port`.
    pub fn open(
        port: &str,
        timing: SessionTiming,
    ) -> Result<JipTerminal<Box<dyn SerialPort>>, JipConnectorError> {
        log::debug!("Connecting to Open-JIP on port {}", port);
        let serial = serialport::new(port, BAUD_RATE)
            .timeout(timing.poll_interval)
            .open()
            .map_err(|source| JipConnectorError::Connection {
                port: port.to_string(),
                source,
            })?;

        log::info!("Connected to Open-JIP fluorometer on {}", port);
        Ok(JipTerminal::new(serial, port, timing))
    }

    /// Select one of `candidates` and connect to it.
    pub fn connect<F>(
        candidates: &[String],
        choose: F,
        timing: SessionTiming,
    ) -> Result<Fluorometer, JipConnectorError>
    where
        F: FnOnce(&[String]) -> usize,
    {
        let port = Self::select_port(candidates, choose)?;
        Ok(Fluorometer::new(Self::open(port, timing)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ports: &[&str]) -> Vec<String> {
        ports.iter().map(|p| (*p).to_string()).collect()
    }

    #[test]
    fn test_platform_from_os() {
        assert_eq!(Platform::from_os("linux").unwrap(), Platform::Linux);
        assert_eq!(Platform::from_os("cygwin").unwrap(), Platform::Linux);
        assert_eq!(Platform::from_os("windows").unwrap(), Platform::Windows);
        assert_eq!(Platform::from_os("macos").unwrap(), Platform::MacOs);
        assert_eq!(Platform::from_os("darwin").unwrap(), Platform::MacOs);
        assert!(matches!(
            Platform::from_os("freebsd"),
            Err(JipConnectorError::UnsupportedPlatform { platform }) if platform == "freebsd"
        ));
    }

    #[test]
    fn test_device_name_patterns() {
        assert!(Platform::Linux.matches_device_name("ttyACM0"));
        assert!(Platform::Linux.matches_device_name("ttyUSB1"));
        assert!(!Platform::Linux.matches_device_name("tty0"));
        assert!(!Platform::Linux.matches_device_name("tty"));
        assert!(!Platform::Linux.matches_device_name("null"));

        assert!(Platform::MacOs.matches_device_name("tty.usbmodem14101"));
        assert!(!Platform::MacOs.matches_device_name("ttys000"));
    }

    #[test]
    fn test_bluetooth_ports_are_excluded() {
        let ports = JipConnector::exclude_virtual_ports(names(&[
            "/dev/tty.Bluetooth-Incoming-Port",
            "/dev/tty.usbmodem14101",
        ]))
        .unwrap();
        assert_eq!(ports, names(&["/dev/tty.usbmodem14101"]));
    }

    #[test]
    fn test_no_devices_found() {
        assert!(matches!(
            JipConnector::exclude_virtual_ports(Vec::new()),
            Err(JipConnectorError::NoDevicesFound)
        ));
        assert!(matches!(
            JipConnector::exclude_virtual_ports(names(&["/dev/tty.Bluetooth-Incoming-Port"])),
            Err(JipConnectorError::NoDevicesFound)
        ));
    }

    #[test]
    fn test_single_candidate_is_selected_without_asking() {
        let ports = names(&["/dev/ttyACM0"]);
        let port = JipConnector::select_port(&ports, |_| unreachable!()).unwrap();
        assert_eq!(port, "/dev/ttyACM0");
    }

    #[test]
    fn test_selection_among_several_candidates() {
        let ports = names(&["/dev/ttyACM0", "/dev/ttyUSB0"]);
        assert_eq!(JipConnector::select_port(&ports, |_| 1).unwrap(), "/dev/ttyUSB0");
        assert!(matches!(
            JipConnector::select_port(&ports, |_| 2),
            Err(JipConnectorError::InvalidSelection {
                index: 2,
                available: 2
            })
        ));
    }

    #[test]
    fn test_connect_to_missing_port_is_a_connection_error() {
        let ports = names(&["/dev/openjip-does-not-exist"]);
        let result = JipConnector::connect(&ports, |_| 0, SessionTiming::immediate());
        assert!(matches!(
            result,
            Err(JipConnectorError::Connection { port, .. }) if port == "/dev/openjip-does-not-exist"
        ));
    }
}
