pub mod lease;
pub mod manager;
pub mod ports;

pub use lease::SandboxLease;
pub use manager::AnvilManager;
pub use ports::{PortAllocator, PortLease};
