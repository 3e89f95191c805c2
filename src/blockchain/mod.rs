pub mod client;
pub mod revert;

pub use client::ForkClient;
