pub mod access;
pub mod anomaly;
pub mod config;
pub mod error;
mod fit;
pub mod gate;
pub mod orchestrator;
pub mod propagator;
pub mod registry;
pub mod trend;

pub use access::{LimitSink, RealmStore, StatsAccessor};
pub use anomaly::AnomalyDetector;
pub use config::ModelerConfig;
pub use error::{ModelError, RealmFailure, RunReport};
pub use gate::ExecutionGate;
pub use orchestrator::{Modeler, MODELER_GATE};
pub use propagator::{QuotaPropagator, StateLimitSink, LIMITER_ENTRY_TTL};
pub use registry::RealmRegistry;
pub use trend::{TrendForecaster, DEFAULT_TREND_DEGREE};
