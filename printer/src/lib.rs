//! # Printer Session and Control
//!
//! This library maintains the authenticated broker session to the printer and
//! layers a print-job lifecycle on top of it.
//!
//! ## Architecture
//!
//! - **session**: TLS MQTT connection, command publishing with monotone
//!   sequence ids, tolerant report parsing, and non-blocking fan-out of every
//!   parsed status to named subscribers
//! - **controller**: owns a session and at most one [`PrintJob`], mapping
//!   printer state transitions onto the job state machine and exposing the
//!   control surface (submit, pause, resume, stop, speed, fan, raw G-code)
//!
//! ## Security Posture
//!
//! The printer presents a self-signed device certificate, so TLS certificate
//! verification is explicitly disabled for this connection. That is the
//! documented posture for LAN-mode printers of this family, not an oversight.
//!
//! ## Ordering Guarantees
//!
//! Status reports are dispatched to subscribers in the order received; each
//! subscriber gets its own channel and task, so a slow subscriber can never
//! stall the receive loop. Command publishes are serialized and carry a
//! monotone `sequence_id` per session.

pub mod controller;
pub mod session;

pub use controller::{ControllerError, JobStatus, PrintController, PrintJob, SubmitOptions};
pub use session::{PrinterSession, SessionError, StatusCallback};
