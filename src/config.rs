use std::env;

// Hard limits for the giveaway commands. Values outside of these
// ranges are rejected before anything is written to the store.
pub const MIN_WINNERS: u32 = 1;
pub const MAX_WINNERS: u32 = 20;
pub const MIN_GIVEAWAY_SECONDS: u64 = 30;
pub const MAX_GIVEAWAY_SECONDS: u64 = 30 * 24 * 60 * 60;
pub const MIN_FILL_ENTRIES: u32 = 1;
pub const MAX_FILL_ENTRIES: u32 = 1000;
pub const MIN_FILL_MINUTES: u64 = 1;
pub const MAX_FILL_MINUTES: u64 = 7 * 24 * 60;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_ENTRIES_PAGE_SIZE: usize = 20;
const DEFAULT_RECOVERY_INTERVAL_SECS: u64 = 300;

#[derive(Clone, Debug)]
pub struct BotConfig {
    // How often the expiry scheduler scans for overdue giveaways.
    pub poll_interval_secs: u64,
    // Page size for the entries listing.
    pub entries_page_size: usize,
    // How often the recovery monitor looks for orphaned fill plans.
    pub recovery_interval_secs: u64,
}

impl BotConfig {
    pub fn from_env() -> Self {
        BotConfig {
            poll_interval_secs: read_var("GIVEAWAY_POLL_INTERVAL", DEFAULT_POLL_INTERVAL_SECS)
                .max(5),
            entries_page_size: read_var("GIVEAWAY_PAGE_SIZE", DEFAULT_ENTRIES_PAGE_SIZE).max(1),
            recovery_interval_secs: read_var(
                "FILL_RECOVERY_INTERVAL",
                DEFAULT_RECOVERY_INTERVAL_SECS,
            )
            .max(30),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        BotConfig {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            entries_page_size: DEFAULT_ENTRIES_PAGE_SIZE,
            recovery_interval_secs: DEFAULT_RECOVERY_INTERVAL_SECS,
        }
    }
}

fn read_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use crate::config::BotConfig;

    #[test]
    fn test_default_config_values() {
        let config = BotConfig::default();

        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.entries_page_size, 20);
        assert_eq!(config.recovery_interval_secs, 300);
    }
}
