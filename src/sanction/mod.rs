//! Hand-off of violations to the external sanction engine

pub mod forwarder;

pub use forwarder::{sign_payload, verify_signature, SanctionError, SanctionForwarder};
