//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → compiled into RouteTable, breakers, registry client
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → dispatcher swaps in the new RouteTable wholesale
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Breaker state and round-robin indices survive a reload

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, BreakerSettings, CircuitBreakerConfig, FallbackConfig, GatewayConfig,
    ListenerConfig, LogFormat, ObservabilityConfig, ProxySettings, RegistryConfig, RouteConfig,
    StaticServiceConfig,
};
