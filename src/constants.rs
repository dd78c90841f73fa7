// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Constants Module
//!
//! Application constants and environment-based configuration values.
//! This module provides both hardcoded constants and environment variable configuration.

use std::env;

/// Service identity
pub mod service {
    /// Service name used in logs
    pub const SERVICE_NAME: &str = "streak-engine";

    /// Service version from Cargo.toml
    pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Environment-based configuration
pub mod env_config {
    use super::env;
    use chrono::Weekday;

    /// Get database URL from environment
    pub fn database_url() -> Option<String> {
        env::var("DATABASE_URL").ok()
    }

    /// Get workout provider name from environment
    pub fn workout_provider() -> Option<String> {
        env::var("WORKOUT_PROVIDER").ok()
    }

    /// Get the first day of the week from environment, e.g. `Mon` or `Sunday`
    pub fn first_weekday() -> Option<Weekday> {
        env::var("FIRST_WEEKDAY").ok().and_then(|raw| raw.parse().ok())
    }

    /// Get log level from environment or default
    pub fn log_level() -> String {
        env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    }
}

/// Engine and application defaults
pub mod defaults {
    use chrono::Weekday;

    /// Weekly intervals start on this day unless configured otherwise
    pub const FIRST_WEEKDAY: Weekday = Weekday::Mon;

    /// Accepted participants needed to start a competition
    pub const MIN_PARTICIPANTS: usize = 2;

    /// Engine rules file looked up in the working directory
    pub const ENGINE_CONFIG_FILE: &str = "engine_config.toml";

    /// Default SQLite location
    pub const DATABASE_URL: &str = "sqlite:./data/competitions.db";

    /// Default workout provider
    pub const WORKOUT_PROVIDER: &str = "memory";
}

/// Unit conversions
pub mod units {
    pub const METERS_PER_KILOMETER: f64 = 1000.0;
    pub const METERS_PER_MILE: f64 = 1609.344;
}

/// User-facing messages for notifications
pub mod messages {
    pub const FLEX_TITLE: &str = "Flex!";
    pub const NUDGE_TITLE: &str = "Nudge";
}
