//! Warehouse authentication.
//!
//! Only Google Application Default Credentials are supported.

mod gcp;

pub use gcp::{GcpAuth, BIGQUERY_SCOPES};
