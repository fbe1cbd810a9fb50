//! Agent library for host resource metrics
//!
//! This crate provides the core functionality for:
//! - Metrics collection from procfs and sysfs
//! - A fixed-size time-series engine with quantile reduction
//! - Bounded JSON rendering of status and detail reports
//! - Health checks and observability

pub mod collector;
pub mod engine;
pub mod error;
pub mod families;
pub mod health;
pub mod models;
pub mod observability;
pub mod report;

pub use engine::{Engine, SharedEngine};
pub use error::{Overflow, SourceError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use report::{Rendered, Reporter, StatusCache};
