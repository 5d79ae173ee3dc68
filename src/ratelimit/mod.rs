//! Sliding-window admission logic and state management.

mod controller;
mod settings;
mod window;

pub use controller::{Admission, AdmissionController, AdmissionKind, WaitMode};
pub use settings::{
    default_base_delay_ms, ConfigField, ConfigUpdate, ConfigValidationError, FieldOutcome,
    RateConfig, UpdateReport,
};
pub use window::{ReservationWindow, WINDOW};
