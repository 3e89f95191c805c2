pub mod errors;

pub use errors::{AuditError, ErrorClass, Result};
