pub mod coordinator;
pub mod traits;

pub use coordinator::{SessionCoordinator, SessionStats, StatsSnapshot};
pub use traits::{SandboxProvider, SandboxRpc, TxReceipt};
