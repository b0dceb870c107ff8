use std::path::PathBuf;
use std::time::Duration;

/// Server settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub jwt_secret: String,
    pub session_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            jwt_secret: "dev-secret-change-me".to_string(),
            session_ttl: Duration::from_secs(30 * 24 * 3600),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = env_parse("PORT").unwrap_or(defaults.port);

        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.jwt_secret);

        let session_ttl = env_parse("SESSION_TTL_SECONDS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.session_ttl);

        Self {
            port,
            jwt_secret,
            session_ttl,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSaveConfig {
    pub interval: Duration,
    pub point_threshold: usize,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            point_threshold: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeolocationConfig {
    pub high_accuracy: bool,
    /// Budget for the first fix when tracking starts.
    pub initial_timeout: Duration,
    /// Budget for each subsequent watch update.
    pub watch_timeout: Duration,
    pub maximum_age: Duration,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            initial_timeout: Duration::from_millis(10_000),
            watch_timeout: Duration::from_millis(5_000),
            maximum_age: Duration::from_millis(1_500),
        }
    }
}

/// What `complete_route` does with the local cache when finalizing fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionCachePolicy {
    /// Clear on every completion path, success or failure.
    #[default]
    AlwaysClear,
    /// Clear only after the remote store confirmed the route; on failure the
    /// route stays cached so the next session can sync it.
    KeepOnFailure,
}

impl CompletionCachePolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "always" => Some(Self::AlwaysClear),
            "on-success" | "on_success" => Some(Self::KeepOnFailure),
            _ => None,
        }
    }
}

/// Client-side tracking settings.
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    pub autosave: AutoSaveConfig,
    pub geolocation: GeolocationConfig,
    pub geocoder_url: String,
    pub geocode_timeout: Duration,
    pub user_agent: String,
    /// Directory for the pending-route cache. `None` disables the cache.
    pub cache_dir: Option<PathBuf>,
    pub completion_cache_policy: CompletionCachePolicy,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            autosave: AutoSaveConfig::default(),
            geolocation: GeolocationConfig::default(),
            geocoder_url: "https://nominatim.openstreetmap.org".to_string(),
            geocode_timeout: Duration::from_millis(3_000),
            user_agent: "Trilhos GPS Tracker".to_string(),
            cache_dir: None,
            completion_cache_policy: CompletionCachePolicy::default(),
        }
    }
}

impl TrackingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let autosave = AutoSaveConfig {
            interval: env_parse("AUTOSAVE_INTERVAL_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.autosave.interval),
            point_threshold: env_parse::<usize>("AUTOSAVE_POINT_THRESHOLD")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.autosave.point_threshold),
        };

        let geolocation = GeolocationConfig {
            high_accuracy: env_parse("GEO_HIGH_ACCURACY")
                .unwrap_or(defaults.geolocation.high_accuracy),
            initial_timeout: env_parse("GEO_INITIAL_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.geolocation.initial_timeout),
            watch_timeout: env_parse("GEO_WATCH_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.geolocation.watch_timeout),
            maximum_age: env_parse("GEO_MAXIMUM_AGE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.geolocation.maximum_age),
        };

        let completion_cache_policy = std::env::var("COMPLETE_CLEARS_CACHE")
            .ok()
            .and_then(|s| CompletionCachePolicy::parse(&s))
            .unwrap_or(defaults.completion_cache_policy);

        Self {
            autosave,
            geolocation,
            geocoder_url: std::env::var("GEOCODER_URL").unwrap_or(defaults.geocoder_url),
            geocode_timeout: env_parse("GEOCODE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.geocode_timeout),
            user_agent: defaults.user_agent,
            cache_dir: std::env::var_os("TRILHOS_CACHE_DIR").map(PathBuf::from),
            completion_cache_policy,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tracking_constants() {
        let config = TrackingConfig::default();
        assert_eq!(config.autosave.interval, Duration::from_secs(30));
        assert_eq!(config.autosave.point_threshold, 10);
        assert_eq!(config.geolocation.initial_timeout, Duration::from_secs(10));
        assert_eq!(config.geolocation.watch_timeout, Duration::from_secs(5));
        assert_eq!(config.geolocation.maximum_age, Duration::from_millis(1500));
        assert!(config.geolocation.high_accuracy);
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn parses_completion_policy() {
        assert_eq!(
            CompletionCachePolicy::parse("on-success"),
            Some(CompletionCachePolicy::KeepOnFailure)
        );
        assert_eq!(
            CompletionCachePolicy::parse(" Always "),
            Some(CompletionCachePolicy::AlwaysClear)
        );
        assert_eq!(CompletionCachePolicy::parse("sometimes"), None);
    }
}
