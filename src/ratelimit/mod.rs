//! Rate limiting and anti-detection: per-domain tracking, global/domain
//! spacing, and user-agent/header rotation.

pub mod anti_detect;
pub mod domain_tracker;
pub mod policy;

pub use anti_detect::{random_headers, random_user_agent, uniform_delay};
pub use domain_tracker::DomainTracker;
pub use policy::{DelayOverride, RateLimitDefaults, RateLimitPolicy};
