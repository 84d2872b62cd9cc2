//! Simulated Open-JIP device shared by the integration tests

use openjip_rs::{Fluorometer, SessionTiming, Transport};
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex};

/// Serves a canned firmware response; writes are recorded in a shared buffer.
pub struct SimulatedDevice {
    output: Cursor<Vec<u8>>,
    received: Arc<Mutex<Vec<u8>>>,
}

impl Read for SimulatedDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.output.read(buf)
    }
}

impl Write for SimulatedDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.received.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for SimulatedDevice {
    fn clear_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Fluorometer backed by a simulated device, plus the bytes sent to it.
#[allow(dead_code)]
pub fn simulated_fluorometer(
    response: &str,
) -> (Fluorometer<SimulatedDevice>, Arc<Mutex<Vec<u8>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let device = SimulatedDevice {
        output: Cursor::new(response.as_bytes().to_vec()),
        received: Arc::clone(&received),
    };
    let fluorometer =
        Fluorometer::with_transport(device, "/dev/ttySIM0", SessionTiming::immediate());
    (fluorometer, received)
}

/// A plausible OJIP induction curve, formatted the way the firmware prints it.
///
/// Samples run from 0.01 ms to roughly 1 s on a log-spaced time axis.
#[allow(dead_code)]
pub fn ojip_response(samples: usize) -> String {
    (0..samples)
        .map(|i| {
            let fraction = i as f64 / (samples - 1) as f64;
            let time = 0.01 * 10f64.powf(5.0 * fraction);
            let value = 0.2 + 0.8 * (1.0 - (-time / 20.0).exp());
            format!("{time:.3}\t{value:.4}\r\n")
        })
        .collect()
}
