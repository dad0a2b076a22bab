//! Blastline core: session lifecycle and bulk dispatch over a messaging
//! protocol client, with templates, analytics and a thin HTTP surface.

pub mod config;
pub mod core_engine;
pub mod core_protocol;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod shutdown;

pub use config::Config;
pub use core_engine::{Engine, SessionPhase};
pub use core_protocol::{LoopbackClient, LoopbackConfig, ProtocolClient};
pub use logging::{init_logging, LogLevel};
