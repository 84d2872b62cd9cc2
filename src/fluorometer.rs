use crate::serial_terminal::{JipTerminal, JipTerminalError, SessionTiming, Transport};
use serialport::SerialPort;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Samples requested per capture unless configured otherwise.
pub const DEFAULT_SAMPLE_COUNT: usize = 1000;

/// Device-side acquisition settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    Gain,
    ActinicIntensity,
}

impl Setting {
    /// Command character understood by the firmware.
    pub fn code(&self) -> char {
        match self {
            Setting::Gain => 'F',
            Setting::ActinicIntensity => 'A',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Setting::Gain => "detection gain",
            Setting::ActinicIntensity => "actinic intensity",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MeasurementError {
    #[error("Incomplete measurement data received: expected {expected} samples, got {received}")]
    Incomplete { expected: usize, received: usize },

    #[error("Malformed sample on line {line_number} ('{line}'): {reason}")]
    Malformed {
        line_number: usize,
        line: String,
        reason: String,
    },

    #[error("Time and value sequences differ in length ({time} vs {value})")]
    LengthMismatch { time: usize, value: usize },

    #[error("Terminal error: {0}")]
    Terminal(#[from] JipTerminalError),
}

impl MeasurementError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, MeasurementError::Terminal(JipTerminalError::Interrupted))
    }
}

/// One fluorescence induction capture: elapsed time in ms paired with volts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transient {
    time: Vec<f64>,
    value: Vec<f64>,
}

impl Transient {
    pub fn new(time: Vec<f64>, value: Vec<f64>) -> Result<Self, MeasurementError> {
        if time.len() != value.len() {
            return Err(MeasurementError::LengthMismatch {
                time: time.len(),
                value: value.len(),
            });
        }
        Ok(Self { time, value })
    }

    /// A transient with no samples; stands for "capture failed".
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn value(&self) -> &[f64] {
        &self.value
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// `(time, value)` pairs in capture order.
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.time.iter().copied().zip(self.value.iter().copied())
    }
}

/// Parse a `<time>\t<value>` line as sent by the firmware.
pub fn parse_sample_line(line: &str) -> Result<(f64, f64), String> {
    let fields: Vec<&str> = line.trim().split('\t').collect();
    let [time, value] = fields.as_slice() else {
        return Err(format!("expected 2 tab-separated fields, found {}", fields.len()));
    };

    let time = time
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid time '{time}': {e}"))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid value '{value}': {e}"))?;
    Ok((time, value))
}

/// High-level handle on a connected Open-JIP fluorometer.
pub struct Fluorometer<T: Transport = Box<dyn SerialPort>> {
    terminal: JipTerminal<T>,
}

impl<T: Transport> Fluorometer<T> {
    pub fn new(terminal: JipTerminal<T>) -> Self {
        Self { terminal }
    }

    /// Wrap a raw transport, mostly for simulated devices.
    pub fn with_transport(serial: T, port: &str, timing: SessionTiming) -> Self {
        Self::new(JipTerminal::new(serial, port, timing))
    }

    pub fn terminal(&self) -> &JipTerminal<T> {
        &self.terminal
    }

    pub fn port(&self) -> &str {
        self.terminal.port()
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.terminal.cancel_handle()
    }

    /// Apply a gain or actinic intensity level.
    ///
    /// Returns `Ok(false)` when the level is out of range; nothing is sent
    /// and the device keeps its defaults.
    pub fn apply_setting(&mut self, setting: Setting, level: u8) -> Result<bool, JipTerminalError> {
        match self.terminal.send_command(setting.code(), level) {
            Ok(()) => {
                log::info!("{} set to {}", setting.as_str(), level);
                Ok(true)
            }
            Err(JipTerminalError::InvalidLevel { .. }) => {
                log::warn!(
                    "Invalid {} {}. Default settings will be used.",
                    setting.as_str(),
                    level
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn set_gain(&mut self, level: u8) -> Result<bool, JipTerminalError> {
        self.apply_setting(Setting::Gain, level)
    }

    pub fn set_actinic_intensity(&mut self, level: u8) -> Result<bool, JipTerminalError> {
        self.apply_setting(Setting::ActinicIntensity, level)
    }

    /// Trigger a measurement and read exactly `sample_count` samples.
    ///
    /// Any shortfall fails the whole capture; partial data is discarded.
    pub fn capture(&mut self, sample_count: usize) -> Result<Transient, MeasurementError> {
        log::info!(
            "Measuring fluorescence on {} ({} samples)",
            self.terminal.port(),
            sample_count
        );
        self.terminal.start_measurement()?;

        let mut time = Vec::with_capacity(sample_count);
        let mut value = Vec::with_capacity(sample_count);

        for line_number in 1..=sample_count {
            let Some(line) = self.terminal.read_line()? else {
                return Err(MeasurementError::Incomplete {
                    expected: sample_count,
                    received: line_number - 1,
                });
            };

            let (t, v) = parse_sample_line(&line).map_err(|reason| MeasurementError::Malformed {
                line_number,
                line: line.clone(),
                reason,
            })?;
            time.push(t);
            value.push(v);
        }

        log::info!("Transient captured");
        Transient::new(time, value)
    }

    pub fn close(&mut self) -> bool {
        self.terminal.close()
    }
}
