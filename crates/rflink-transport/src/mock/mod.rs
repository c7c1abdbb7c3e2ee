//! Mock collaborators for tests and host-app bring-up.
//!
//! Every seam the controllers depend on has a scriptable stand-in here: a
//! reader API that records installs and can fail on cue, and radio/bus
//! mediums whose link and attach lifecycles are driven by the test.

mod bus;
mod radio;
mod reader;

pub use bus::MockBusMedium;
pub use radio::MockRadioMedium;
pub use reader::MockReader;

/// Lock a std mutex, recovering from poisoning. Mock state is plain data,
/// so a panicked holder leaves nothing half-updated worth dying over.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
