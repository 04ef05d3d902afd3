//! Repository pattern implementations for the analytics and staging stores.

pub mod analytics_repo;
pub mod staging_repo;

pub use analytics_repo::{AnalyticsRepository, AnalyticsStats, DailyTrend};
pub use staging_repo::{StagingRepository, StagingStats};
