use std::time::Duration;

/// Runtime configuration, read once at startup from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port for the HTTP/WebSocket server
    pub port: u16,
    /// How long a room lives after creation
    pub room_ttl: Duration,
    /// How long a participant may go without a heartbeat before removal
    pub participant_ttl: Duration,
    /// How often the background sweep runs
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            room_ttl: Duration::from_secs(60 * 60),
            participant_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Reads `PORT`, `ROOM_TTL_MS`, `PARTICIPANT_TTL_MS` and
    /// `SWEEP_INTERVAL_MS`, falling back to defaults for anything missing
    /// or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("PORT").unwrap_or(defaults.port),
            room_ttl: env_ms("ROOM_TTL_MS").unwrap_or(defaults.room_ttl),
            participant_ttl: env_ms("PARTICIPANT_TTL_MS").unwrap_or(defaults.participant_ttl),
            sweep_interval: env_ms("SWEEP_INTERVAL_MS").unwrap_or(defaults.sweep_interval),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}

fn env_ms(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}
