pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod playback;
pub mod policy;
pub mod stats;
pub mod types;

pub use config::ViewerConfig;
pub use errors::{ConfigError, HealthError, PlaybackError, SignalingError, TransportError};
pub use lifecycle::{Effect, Input, Lifecycle};
pub use playback::{PlaybackSettings, Quality};
pub use policy::ReconnectPolicy;
pub use stats::StatsMeter;
pub use types::*;
