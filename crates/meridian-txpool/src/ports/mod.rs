//! Ports to external collaborators.

pub mod outbound;

pub use outbound::{CheckTxHost, RuntimeHostProvisioner, TransactionPublisher};
