//! Presentation side of the panel.
//!
//! The core never renders anything itself; it accepts requests and emits
//! notifications. [`console`] is the front end shipped with the binary.

pub mod console;
