//! # Open-JIP RS
//!
//! A Rust library for operating the Open-JIP open-source chlorophyll fluorometer
//! over its USB serial link.
//!
//! The library discovers the device, applies gain and actinic light settings,
//! triggers a fluorescence induction (OJIP) transient, derives the usual
//! photosynthesis parameters from it and keeps every capture in a flat CSV file
//! that can be rendered as an interactive plot.
//!
//! ## Features
//!
//! - **Port discovery**: OS-specific enumeration of serial devices, Bluetooth ports excluded
//! - **Device session**: single-character setting commands, measurement trigger, per-line timeouts
//! - **Acquisition**: exactly-N `<time>\t<value>` lines parsed into a [`Transient`]
//! - **Parameters**: Fo, Fj, Fi, Fm, Fv and quantum yield with a health classification
//! - **Persistence**: append-only CSV store using `polars`
//! - **Plotting**: standalone HTML with a log/linear time-axis toggle
//!
//! ## Examples
//!
//! ### Capture and analyse a transient
//!
//! ```rust,no_run
//! use openjip_rs::{compute_parameters, JipConnector, Platform, SessionTiming, TransientStore};
//!
//! let ports = JipConnector::available_ports(Platform::current()?)?;
//! let mut fluorometer = JipConnector::connect(&ports, |_| 0, SessionTiming::default())?;
//!
//! fluorometer.set_gain(2)?;
//! fluorometer.set_actinic_intensity(3)?;
//!
//! let transient = fluorometer.capture(1000)?;
//! println!("{}", compute_parameters(&transient)?);
//!
//! TransientStore::new("Open-JIP_Data.csv").append(&transient)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Plot every stored capture
//!
//! ```rust,no_run
//! use openjip_rs::{plot, AxisScale, TransientStore};
//!
//! let records = TransientStore::new("Open-JIP_Data.csv").load_all()?;
//! plot::write_html(&records, AxisScale::Log, "Open-JIP_Plot.html")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Parameters from known samples
//!
//! ```rust
//! use openjip_rs::{compute_parameters, Transient};
//!
//! let transient = Transient::new(
//!     vec![0.0, 0.1, 0.2, 0.3, 2.0, 30.0, 300.0],
//!     vec![0.1, 0.1, 0.1, 0.2, 0.5, 0.8, 1.0],
//! )
//! .unwrap();
//!
//! let params = compute_parameters(&transient).unwrap();
//! assert_eq!(params.fo.value, 0.2);
//! assert_eq!(params.fm.value, 1.0);
//! assert_eq!(params.fj.map(|fj| fj.value), Some(0.5));
//! ```

pub mod fluorometer;
pub mod jip_connector;
pub mod parameters;
pub mod plot;
pub mod serial_terminal;
pub mod shutdown;
pub mod store;

// Re-export the main types for convenience
pub use serial_terminal::{JipTerminal, JipTerminalError, SessionTiming, Transport};

pub use jip_connector::{JipConnector, JipConnectorError, Platform};

pub use fluorometer::{Fluorometer, MeasurementError, Setting, Transient};

pub use parameters::{compute_parameters, DerivedParameters, Health, ParameterError, TimedValue};

pub use store::{StoreError, StoredRecord, TransientStore};

pub use plot::{AxisScale, PlotError};
