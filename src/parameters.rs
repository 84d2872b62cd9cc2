//! OJIP parameters derived from a single [`Transient`].
//!
//! Fo is read at a fixed sample index, Fm is the maximum after the first two
//! samples, and Fj/Fi are the first samples whose time truncates to 2 ms and
//! 30 ms respectively. Transients that never reach those times leave Fj/Fi
//! unset instead of failing.

use crate::fluorometer::Transient;
use std::fmt;

/// Index of the Fo sample. Tied to the firmware's sampling schedule.
pub const FO_INDEX: usize = 3;

/// First index considered when searching for Fm.
pub const FM_SEARCH_START: usize = 2;

/// Truncated time (ms) of the J step.
pub const FJ_TIME_MS: f64 = 2.0;

/// Truncated time (ms) of the I step.
pub const FI_TIME_MS: f64 = 30.0;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParameterError {
    #[error("Empty data received. Cannot calculate parameters.")]
    Empty,

    #[error("Transient too short: {len} samples, at least {required} needed")]
    TooShort { len: usize, required: usize },

    #[error("Maximum fluorescence is zero; quantum yield is undefined")]
    ZeroMaximum,
}

/// Fluorescence level and the time it was sampled at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedValue {
    pub value: f64,
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Poor,
    ModeratelyHealthy,
    Healthy,
}

impl Health {
    pub fn from_quantum_yield(quantum_yield: f64) -> Self {
        if quantum_yield >= 0.7 {
            Health::Healthy
        } else if quantum_yield >= 0.5 {
            Health::ModeratelyHealthy
        } else {
            Health::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Health::Poor => "Poor health",
            Health::ModeratelyHealthy => "Moderately healthy",
            Health::Healthy => "Healthy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedParameters {
    pub fo: TimedValue,
    pub fj: Option<TimedValue>,
    pub fi: Option<TimedValue>,
    pub fm: TimedValue,
    pub fv: f64,
    pub quantum_yield: f64,
}

impl DerivedParameters {
    pub fn health(&self) -> Health {
        Health::from_quantum_yield(self.quantum_yield)
    }
}

fn first_at_truncated_time(transient: &Transient, time_ms: f64) -> Option<TimedValue> {
    transient
        .samples()
        .find(|(time, _)| time.trunc() == time_ms)
        .map(|(time, value)| TimedValue { value, time })
}

pub fn compute_parameters(transient: &Transient) -> Result<DerivedParameters, ParameterError> {
    if transient.is_empty() {
        return Err(ParameterError::Empty);
    }
    if transient.len() <= FO_INDEX {
        return Err(ParameterError::TooShort {
            len: transient.len(),
            required: FO_INDEX + 1,
        });
    }

    let time = transient.time();
    let value = transient.value();

    let fo = TimedValue {
        value: value[FO_INDEX],
        time: time[FO_INDEX],
    };

    // first occurrence wins on ties
    let mut fm_index = FM_SEARCH_START;
    for (i, v) in value.iter().enumerate().skip(FM_SEARCH_START + 1) {
        if *v > value[fm_index] {
            fm_index = i;
        }
    }
    let fm = TimedValue {
        value: value[fm_index],
        time: time[fm_index],
    };

    if fm.value == 0.0 {
        return Err(ParameterError::ZeroMaximum);
    }

    let fv = fm.value - fo.value;

    Ok(DerivedParameters {
        fo,
        fj: first_at_truncated_time(transient, FJ_TIME_MS),
        fi: first_at_truncated_time(transient, FI_TIME_MS),
        fm,
        fv,
        quantum_yield: fv / fm.value,
    })
}

fn write_step(f: &mut fmt::Formatter<'_>, name: &str, step: Option<&TimedValue>) -> fmt::Result {
    match step {
        Some(step) => writeln!(f, "{name}: {:.4} V @ {:.3} ms", step.value, step.time),
        None => writeln!(f, "{name}: not reached"),
    }
}

impl fmt::Display for DerivedParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_step(f, "Fo", Some(&self.fo))?;
        write_step(f, "Fj", self.fj.as_ref())?;
        write_step(f, "Fi", self.fi.as_ref())?;
        write_step(f, "Fm", Some(&self.fm))?;
        writeln!(f, "Fv: {:.4} V", self.fv)?;
        write!(
            f,
            "Quantum yield (Fv/Fm): {:.3} ({})",
            self.quantum_yield,
            self.health().as_str()
        )
    }
}
