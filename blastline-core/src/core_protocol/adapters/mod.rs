//! Protocol client implementations

pub mod loopback;

pub use loopback::{LoopbackClient, LoopbackConfig, SentMessage};
