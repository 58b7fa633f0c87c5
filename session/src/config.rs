//! Configuration for the session store and the Supabase adapter.
//!
//! Values come from the application, either built in code through the
//! `with_*` setters or read from the environment with `from_env()`.

use crate::error::SessionError;
use gatehouse_runtime::retry::RetryPolicy;
use std::time::Duration;

/// Route paths used by the guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    /// Where signed-out visitors are sent.
    ///
    /// Default: `/login`
    pub login: String,

    /// Where signed-in visitors without completed onboarding are sent.
    ///
    /// Default: `/new-account-registration`
    pub onboarding: String,

    /// Where signed-in visitors leaving public-only routes are sent.
    ///
    /// Default: `/`
    pub home: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            onboarding: "/new-account-registration".to_string(),
            home: "/".to_string(),
        }
    }
}

impl RouteConfig {
    /// Set the login route.
    #[must_use]
    pub fn with_login(mut self, path: impl Into<String>) -> Self {
        self.login = path.into();
        self
    }

    /// Set the onboarding route.
    #[must_use]
    pub fn with_onboarding(mut self, path: impl Into<String>) -> Self {
        self.onboarding = path.into();
        self
    }

    /// Set the home route.
    #[must_use]
    pub fn with_home(mut self, path: impl Into<String>) -> Self {
        self.home = path.into();
        self
    }
}

/// Session store configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthConfig {
    /// URL the provider sends the browser back to after OAuth.
    ///
    /// Default: `http://localhost:5173` (the application origin in development)
    pub redirect_to: String,

    /// Guard routes.
    pub routes: RouteConfig,

    /// Upper bound for each provider call; `None` waits indefinitely.
    ///
    /// Default: 15 seconds
    pub request_timeout: Option<Duration>,

    /// Backoff for the initial session retrieval.
    ///
    /// Default: 2 retries starting at 200ms
    pub session_retry: RetryPolicy,

    /// How long `shutdown` waits for in-flight lookups.
    ///
    /// Default: 5 seconds
    pub shutdown_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            redirect_to: "http://localhost:5173".to_string(),
            routes: RouteConfig::default(),
            request_timeout: Some(Duration::from_secs(15)),
            session_retry: RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(200))
                .max_delay(Duration::from_secs(2))
                .build(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl AuthConfig {
    /// Configuration with the given OAuth redirect target.
    #[must_use]
    pub fn new(redirect_to: impl Into<String>) -> Self {
        Self {
            redirect_to: redirect_to.into(),
            ..Self::default()
        }
    }

    /// Load from environment variables.
    ///
    /// - `GATEHOUSE_REDIRECT_URL`: OAuth redirect target
    /// - `GATEHOUSE_REQUEST_TIMEOUT_SECS`: provider timeout, `0` disables it
    ///
    /// Unset or unparsable values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let redirect_to =
            std::env::var("GATEHOUSE_REDIRECT_URL").unwrap_or_else(|_| defaults.redirect_to.clone());

        let request_timeout = std::env::var("GATEHOUSE_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map_or(defaults.request_timeout, |secs| {
                (secs > 0).then(|| Duration::from_secs(secs))
            });

        Self {
            redirect_to,
            request_timeout,
            ..defaults
        }
    }

    /// Set the route paths.
    #[must_use]
    pub fn with_routes(mut self, routes: RouteConfig) -> Self {
        self.routes = routes;
        self
    }

    /// Set the provider call timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the initial session retry policy.
    #[must_use]
    pub fn with_session_retry(mut self, policy: RetryPolicy) -> Self {
        self.session_retry = policy;
        self
    }

    /// Set the shutdown timeout.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Supabase project configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyzcompany.supabase.co`
    pub url: String,

    /// Public anon key
    pub anon_key: String,

    /// Table holding profile rows.
    ///
    /// Default: `profiles`
    pub profiles_table: String,
}

impl SupabaseConfig {
    /// Configuration for a project.
    #[must_use]
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            profiles_table: "profiles".to_string(),
        }
    }

    /// Load from environment variables.
    ///
    /// - `SUPABASE_URL` (required)
    /// - `SUPABASE_ANON_KEY` (required)
    /// - `SUPABASE_PROFILES_TABLE` (default `profiles`)
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if a required variable is unset
    /// or empty.
    pub fn from_env() -> Result<Self, SessionError> {
        let required = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| SessionError::Configuration(format!("{name} is not set")))
        };

        let mut config = Self::new(required("SUPABASE_URL")?, required("SUPABASE_ANON_KEY")?);
        if let Ok(table) = std::env::var("SUPABASE_PROFILES_TABLE") {
            config.profiles_table = table;
        }
        Ok(config)
    }

    /// Set the profiles table.
    #[must_use]
    pub fn with_profiles_table(mut self, table: impl Into<String>) -> Self {
        self.profiles_table = table.into();
        self
    }
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .field("profiles_table", &self.profiles_table)
            .finish()
    }
}
