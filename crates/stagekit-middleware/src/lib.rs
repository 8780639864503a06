//! Standard `Middleware` implementations registered the same way as
//! user-defined middleware: logging, metrics, performance alerting,
//! validation, rate limiting, circuit breaking, timeout, audit, tracing,
//! caching, and bulkhead isolation.

mod audit;
mod bulkhead;
mod caching;
mod circuit_breaker;
mod logging;
mod metrics;
mod performance;
mod rate_limit;
mod timeout;
mod trace;
mod validation;

pub use audit::{AuditMiddleware, IdentityResolver};
pub use bulkhead::BulkheadMiddleware;
pub use caching::{CachingMiddleware, KeyFn};
pub use circuit_breaker::CircuitBreakerMiddleware;
pub use logging::LoggingMiddleware;
pub use metrics::{MetricsEvent, MetricsMiddleware, MetricsSink};
pub use performance::PerformanceMiddleware;
pub use rate_limit::RateLimitMiddleware;
pub use timeout::TimeoutMiddleware;
pub use trace::TracingMiddleware;
pub use validation::{ValidationMiddleware, Validator};
