pub mod config;
pub mod context;
pub mod runtime;
pub mod service;
pub mod telemetry;

pub use config::ControlPlaneConfig;
pub use context::AppContext;
pub use runtime::{Platform, PlatformRuntime};
pub use service::ServiceRegistration;
