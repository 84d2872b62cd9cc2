use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Baud rate the Open-JIP firmware listens on.
pub const BAUD_RATE: u32 = 115_200;

/// Levels accepted by the gain and actinic intensity commands.
pub const LEVEL_RANGE: RangeInclusive<u8> = 1..=4;

/// Starts a fluorescence transient. Sent without a trailing newline.
pub const MEASURE_COMMAND: &[u8] = b"MF";

/// Byte stream the session talks through.
///
/// Implemented for real serial ports; tests substitute an in-memory stream.
pub trait Transport: Read + Write + Send {
    /// Drop anything the device sent that has not been read yet.
    fn clear_input(&mut self) -> io::Result<()>;
}

impl Transport for Box<dyn SerialPort> {
    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JipTerminalError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout error: no complete line after {waited:?} (received so far: '{partial}')")]
    Timeout { waited: Duration, partial: String },

    #[error("Interrupted while waiting for the device")]
    Interrupted,

    #[error("Session is closed")]
    Closed,

    #[error("Invalid level {level} for command '{code}' (expected 1-4)")]
    InvalidLevel { code: char, level: u8 },

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Delays and deadlines used while talking to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// Pause between clearing input and writing a setting command.
    pub settle: Duration,
    /// Pause that lets the firmware reset before a measurement starts.
    pub reset: Duration,
    /// Longest wait for one complete line. `None` waits forever.
    pub line_timeout: Option<Duration>,
    /// Read timeout of the underlying port; bounds how quickly an
    /// interrupt or an expired deadline is noticed.
    pub poll_interval: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(200),
            reset: Duration::from_secs(1),
            line_timeout: Some(Duration::from_secs(5)),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl SessionTiming {
    /// No settle or reset delays. Useful against simulated devices.
    pub fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            reset: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_line_timeout(mut self, line_timeout: Option<Duration>) -> Self {
        self.line_timeout = line_timeout;
        self
    }
}

/// An open session with one fluorometer.
///
/// Owns the transport until [`JipTerminal::close`] is called or the session
/// is dropped; either path releases it exactly once.
pub struct JipTerminal<T: Transport> {
    serial: Option<T>,
    port: String,
    timing: SessionTiming,
    cancel: Arc<AtomicBool>,
}

impl<T: Transport> JipTerminal<T> {
    pub fn new(serial: T, port: impl Into<String>, timing: SessionTiming) -> Self {
        Self {
            serial: Some(serial),
            port: port.into(),
            timing,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn timing(&self) -> SessionTiming {
        self.timing
    }

    pub fn is_open(&self) -> bool {
        self.serial.is_some()
    }

    /// The underlying transport, while the session is open.
    pub fn transport(&self) -> Option<&T> {
        self.serial.as_ref()
    }

    /// Flag that aborts a pending [`JipTerminal::read_line`] when raised.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn serial(&mut self) -> Result<&mut T, JipTerminalError> {
        self.serial.as_mut().ok_or(JipTerminalError::Closed)
    }

    /// Whether an interrupt has been requested through the cancel handle.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn check_cancelled(&self) -> Result<(), JipTerminalError> {
        if self.is_cancelled() {
            return Err(JipTerminalError::Interrupted);
        }
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), JipTerminalError> {
        self.serial()?.clear_input()?;
        Ok(())
    }

    /// Send a setting command such as `F2\n` (gain 2) or `A3\n` (actinic 3).
    ///
    /// Levels outside 1-4 are rejected before anything is written.
    pub fn send_command(&mut self, code: char, level: u8) -> Result<(), JipTerminalError> {
        if !LEVEL_RANGE.contains(&level) {
            log::warn!("Rejecting command '{}' with level {}", code, level);
            return Err(JipTerminalError::InvalidLevel { code, level });
        }

        self.clear_input()?;
        thread::sleep(self.timing.settle);
        self.check_cancelled()?;

        let command = format!("{code}{level}\n");
        log::debug!("Sending command {:?} to {}", command, self.port);
        let serial = self.serial()?;
        serial.write_all(command.as_bytes())?;
        serial.flush()?;
        Ok(())
    }

    /// Clear stale input, wait for the device to reset and trigger a capture.
    pub fn start_measurement(&mut self) -> Result<(), JipTerminalError> {
        self.clear_input()?;
        thread::sleep(self.timing.reset);
        self.check_cancelled()?;

        log::debug!("Sending measurement command to {}", self.port);
        let serial = self.serial()?;
        serial.write_all(MEASURE_COMMAND)?;
        serial.flush()?;
        Ok(())
    }

    /// Read one newline-terminated line, without the terminator.
    ///
    /// Returns `Ok(None)` once the stream has ended with nothing buffered.
    /// A trailing line without a newline is returned as-is.
    pub fn read_line(&mut self) -> Result<Option<String>, JipTerminalError> {
        let line_timeout = self.timing.line_timeout;
        let cancel = Arc::clone(&self.cancel);
        let serial = self.serial()?;

        let mut line = Vec::new();
        let start = Instant::now();

        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(JipTerminalError::Interrupted);
            }

            let mut byte = [0u8; 1];
            match serial.read(&mut byte) {
                Ok(0) => {
                    if line.is_empty() {
                        return Ok(None);
                    }
                    break;
                }
                Ok(_) => {
                    if byte[0] == b'\n' {
                        break;
                    }
                    line.push(byte[0]);
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(e.into()),
            }

            if let Some(waited) = line_timeout {
                if start.elapsed() >= waited {
                    return Err(JipTerminalError::Timeout {
                        waited,
                        partial: String::from_utf8_lossy(&line).into_owned(),
                    });
                }
            }
        }

        let text = String::from_utf8(line)?;
        Ok(Some(text.trim_end_matches('\r').to_string()))
    }

    /// Release the transport. Returns `false` if it was already released.
    pub fn close(&mut self) -> bool {
        match self.serial.take() {
            Some(_) => {
                log::info!("Closed connection to {}", self.port);
                true
            }
            None => false,
        }
    }
}

impl<T: Transport> Drop for JipTerminal<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Transport;
    use std::collections::VecDeque;
    use std::io::{self, Cursor, Read, Write};

    /// In-memory device: serves a canned response and records writes.
    pub struct MockTransport {
        input: Cursor<Vec<u8>>,
        pub written: Vec<u8>,
        pub clears: usize,
        stalls: VecDeque<usize>,
    }

    impl MockTransport {
        pub fn new(response: &str) -> Self {
            Self {
                input: Cursor::new(response.as_bytes().to_vec()),
                written: Vec::new(),
                clears: 0,
                stalls: VecDeque::new(),
            }
        }

        /// A device that never answers: every read times out.
        pub fn silent() -> Self {
            let mut mock = Self::new("");
            mock.stalls.push_back(usize::MAX);
            mock
        }

        pub fn written_str(&self) -> String {
            String::from_utf8_lossy(&self.written).into_owned()
        }
    }

    impl Read for MockTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if let Some(remaining) = self.stalls.front_mut() {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
                }
                self.stalls.pop_front();
            }
            self.input.read(buf)
        }
    }

    impl Write for MockTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Transport for MockTransport {
        fn clear_input(&mut self) -> io::Result<()> {
            self.clears += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MockTransport;
    use super::*;

    fn terminal(response: &str) -> JipTerminal<MockTransport> {
        JipTerminal::new(
            MockTransport::new(response),
            "/dev/ttyMOCK0",
            SessionTiming::immediate(),
        )
    }

    #[test]
    fn test_send_command_writes_code_level_newline() {
        let mut terminal = terminal("");
        terminal.send_command('F', 2).unwrap();
        terminal.send_command('A', 4).unwrap();

        let mock = terminal.transport().unwrap();
        assert_eq!(mock.written_str(), "F2\nA4\n");
        assert_eq!(mock.clears, 2);
    }

    #[test]
    fn test_send_command_rejects_out_of_range_level() {
        let mut terminal = terminal("");
        for level in [0, 5, 9] {
            let err = terminal.send_command('F', level).unwrap_err();
            assert!(matches!(
                err,
                JipTerminalError::InvalidLevel { code: 'F', level: l } if l == level
            ));
        }
        assert!(terminal.transport().unwrap().written.is_empty());
    }

    #[test]
    fn test_start_measurement_sends_mf_without_newline() {
        let mut terminal = terminal("");
        terminal.start_measurement().unwrap();
        assert_eq!(terminal.transport().unwrap().written, b"MF");
    }

    #[test]
    fn test_read_line_strips_terminators() {
        let mut terminal = terminal("0.012\t0.1000\r\n0.020\t0.1100\nlast");
        assert_eq!(terminal.read_line().unwrap().as_deref(), Some("0.012\t0.1000"));
        assert_eq!(terminal.read_line().unwrap().as_deref(), Some("0.020\t0.1100"));
        assert_eq!(terminal.read_line().unwrap().as_deref(), Some("last"));
        assert_eq!(terminal.read_line().unwrap(), None);
    }

    #[test]
    fn test_read_line_times_out_on_silent_device() {
        let timing = SessionTiming::immediate().with_line_timeout(Some(Duration::from_millis(20)));
        let mut terminal = JipTerminal::new(MockTransport::silent(), "/dev/ttyMOCK0", timing);

        let err = terminal.read_line().unwrap_err();
        assert!(matches!(err, JipTerminalError::Timeout { .. }));
    }

    #[test]
    fn test_read_line_observes_cancel_flag() {
        let mut terminal = terminal("0.012\t0.1000\n");
        terminal.cancel_handle().store(true, Ordering::SeqCst);
        assert!(matches!(terminal.read_line(), Err(JipTerminalError::Interrupted)));
    }

    #[test]
    fn test_cancelled_session_sends_nothing() {
        let mut terminal = terminal("");
        terminal.cancel_handle().store(true, Ordering::SeqCst);

        assert!(matches!(terminal.send_command('F', 2), Err(JipTerminalError::Interrupted)));
        assert!(matches!(terminal.start_measurement(), Err(JipTerminalError::Interrupted)));
        assert!(terminal.transport().unwrap().written.is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut terminal = terminal("");
        assert!(terminal.is_open());
        assert!(terminal.close());
        assert!(!terminal.close());
        assert!(!terminal.is_open());
        assert!(matches!(terminal.send_command('F', 1), Err(JipTerminalError::Closed)));
        assert!(matches!(terminal.read_line(), Err(JipTerminalError::Closed)));
    }
}
