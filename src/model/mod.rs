//! Activity classifier network.

pub mod network;

pub use network::{ActivityNet, ActivityNetConfig};
