pub mod compensation;
pub mod compressor;
pub mod config;
pub mod deadband;
pub mod engine;
pub mod fan;
pub mod rates;
pub mod resolver;
pub mod topics;
pub mod types;

pub use compensation::Compensation;
pub use compressor::{CompressorState, GuardVerdict};
pub use config::{EngineConfig, ExpansionPolicy, NetworkConfig, RuntimeConfig, ZoneDefaults};
pub use engine::{CommandError, DualZoneEngine, EngineState, TickReport, ZoneCommand, ZoneState};
pub use rates::{LearnedRate, ZoneRates};
pub use resolver::Resolution;
pub use topics::*;
pub use types::{
    FanSpeed, HvacMode, LearningStatus, RateSnapshot, TelemetrySnapshot, ZoneId, ZonePair,
    ZoneTelemetry,
};
