//! Releasing the serial handle when the process is interrupted.
//!
//! Normal returns and errors release the port through `Drop`. Ctrl-C is
//! handled on a dedicated thread: an idle session is closed right away and
//! the process exits. A session that is busy gets its cancel flag raised;
//! the device operation in progress fails with `Interrupted` and the main
//! thread closes the session via [`release_if_interrupted`] before exiting.

use crate::fluorometer::Fluorometer;
use crate::serial_terminal::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

/// Conventional exit status after SIGINT.
pub const INTERRUPT_EXIT_CODE: i32 = 130;

pub type SharedFluorometer<T> = Arc<Mutex<Fluorometer<T>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// The session was idle and has been closed.
    Released,
    /// A device operation holds the session; it was asked to stop.
    CaptureCancelled,
}

/// Lock the shared session, recovering it if a previous holder panicked.
pub fn lock_session<T: Transport>(
    session: &Mutex<Fluorometer<T>>,
) -> MutexGuard<'_, Fluorometer<T>> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Closes the shared session when dropped.
///
/// The interrupt thread keeps its own reference to the session alive, so the
/// session's own `Drop` never runs on a normal exit; this guard stands in.
pub struct CloseOnDrop<T: Transport>(SharedFluorometer<T>);

impl<T: Transport> CloseOnDrop<T> {
    pub fn new(session: SharedFluorometer<T>) -> Self {
        Self(session)
    }
}

impl<T: Transport> Drop for CloseOnDrop<T> {
    fn drop(&mut self) {
        lock_session(&self.0).close();
    }
}

/// React to an interrupt without blocking on a busy session.
pub fn release_or_cancel<T: Transport>(
    session: &Mutex<Fluorometer<T>>,
    cancel: &AtomicBool,
) -> InterruptOutcome {
    match session.try_lock() {
        Ok(mut fluorometer) => {
            fluorometer.close();
            InterruptOutcome::Released
        }
        Err(TryLockError::Poisoned(poisoned)) => {
            poisoned.into_inner().close();
            InterruptOutcome::Released
        }
        Err(TryLockError::WouldBlock) => {
            cancel.store(true, Ordering::SeqCst);
            InterruptOutcome::CaptureCancelled
        }
    }
}

/// Close the session if an interrupt is pending.
///
/// Returns `true` when the caller should exit with [`INTERRUPT_EXIT_CODE`].
pub fn release_if_interrupted<T: Transport>(
    session: &Mutex<Fluorometer<T>>,
    cancel: &AtomicBool,
) -> bool {
    if !cancel.load(Ordering::SeqCst) {
        return false;
    }
    lock_session(session).close();
    true
}

/// Spawn the thread that waits for Ctrl-C.
pub fn install_interrupt_handler<T>(session: SharedFluorometer<T>, cancel: Arc<AtomicBool>)
where
    T: Transport + 'static,
{
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                log::error!("Failed to create signal handler runtime: {}", e);
                return;
            }
        };

        loop {
            let received = rt.block_on(async { tokio::signal::ctrl_c().await });
            if let Err(e) = received {
                log::error!("Failed to listen for Ctrl+C: {}", e);
                return;
            }

            log::warn!("Received Ctrl+C - releasing the fluorometer");
            match release_or_cancel(&session, &cancel) {
                InterruptOutcome::Released => std::process::exit(INTERRUPT_EXIT_CODE),
                InterruptOutcome::CaptureCancelled => {
                    log::warn!("Fluorometer busy - cancelling the current operation");
                }
            }
        }
    });
}
