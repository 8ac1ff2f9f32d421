//! Typed view over the engine's environment variables, read after [`crate::load_and_apply`]
//! has applied `.env`/XDG values to the process environment.

use std::path::PathBuf;

/// Runtime settings sourced from environment variables (spec §6 "Configuration").
#[derive(Clone, Debug)]
pub struct Settings {
    /// `COWORK_WORKDIR`: root directory under which per-project workdirs are created.
    pub cowork_workdir: PathBuf,
    /// `CAMEL_WORKDIR`: legacy override some deployments still set; takes priority over
    /// `COWORK_WORKDIR` when present, matching the upstream runtime's fallback order.
    pub camel_workdir: Option<PathBuf>,
    /// `RUNTIME_SKILLS_V2`: one of `on`, `shadow`, `off` (default `off`). Kept as the raw
    /// normalized string rather than a bool so callers can distinguish shadow mode from off.
    pub runtime_skills_v2: String,
    /// `MEMORY_SEARCH_PAST_CHATS`: enables cross-thread memory search in context assembly.
    pub memory_search_past_chats: bool,
    /// `TOOL_PERMISSION_TIMEOUT_SECONDS`: how long an `ask_user` approval wait blocks before
    /// falling back to the default-allow decision. Floored at 1.0, defaults to 120.0.
    pub tool_permission_timeout_seconds: f64,
    /// `TOOL_PERMISSION_DEFAULT_ALLOW`: explicit override for the approval-timeout fallback.
    /// `None` means "derive from `app_env`" (development env defaults to allow).
    pub tool_permission_default_allow: Option<bool>,
    /// `APP_ENV`: deployment environment name, e.g. `"development"` or `"production"`.
    pub app_env: String,
    /// `CORE_API_URL`: base URL of the Core service client.
    pub core_api_url: Option<String>,
    /// `CORE_API_INTERNAL_KEY`: shared secret sent as `X-Internal-Key` to the Core service.
    pub core_api_internal_key: Option<String>,
}

impl Settings {
    /// Reads settings from the current process environment. Call after [`crate::load_and_apply`]
    /// so that `.env`/XDG-sourced values are already visible to `std::env::var`.
    pub fn from_env() -> Self {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        Self {
            cowork_workdir: std::env::var("COWORK_WORKDIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_workdir()),
            camel_workdir: std::env::var("CAMEL_WORKDIR").ok().map(PathBuf::from),
            runtime_skills_v2: std::env::var("RUNTIME_SKILLS_V2")
                .map(|v| v.trim().to_ascii_lowercase())
                .unwrap_or_else(|_| "off".to_string()),
            memory_search_past_chats: parse_bool_env("MEMORY_SEARCH_PAST_CHATS", false),
            tool_permission_timeout_seconds: parse_permission_timeout(),
            tool_permission_default_allow: std::env::var("TOOL_PERMISSION_DEFAULT_ALLOW")
                .ok()
                .map(|v| is_truthy(&v)),
            core_api_url: std::env::var("CORE_API_URL").ok(),
            core_api_internal_key: std::env::var("CORE_API_INTERNAL_KEY").ok(),
            app_env,
        }
    }

    /// Resolves the effective workdir root: `CAMEL_WORKDIR` wins when set, else `COWORK_WORKDIR`.
    pub fn resolved_workdir(&self) -> &std::path::Path {
        self.camel_workdir.as_deref().unwrap_or(&self.cowork_workdir)
    }

    /// Whether a stalled approval request should default to "allow" once its timeout fires.
    pub fn default_tool_permission_allow(&self) -> bool {
        self.tool_permission_default_allow
            .unwrap_or_else(|| self.app_env == "development")
    }
}

fn default_workdir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("cowork")
        .join("workdirs")
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => is_truthy(&v),
        Err(_) => default,
    }
}

fn parse_permission_timeout() -> f64 {
    const DEFAULT: f64 = 120.0;
    const MIN: f64 = 1.0;
    std::env::var("TOOL_PERMISSION_TIMEOUT_SECONDS")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v.max(MIN))
        .unwrap_or(DEFAULT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn restore(key: &str, prev: Option<String>) {
        match prev {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
    }

    #[test]
    fn defaults_to_120_second_timeout() {
        let prev = env::var("TOOL_PERMISSION_TIMEOUT_SECONDS").ok();
        env::remove_var("TOOL_PERMISSION_TIMEOUT_SECONDS");
        assert_eq!(parse_permission_timeout(), 120.0);
        restore("TOOL_PERMISSION_TIMEOUT_SECONDS", prev);
    }

    #[test]
    fn floors_timeout_at_one_second() {
        let prev = env::var("TOOL_PERMISSION_TIMEOUT_SECONDS").ok();
        env::set_var("TOOL_PERMISSION_TIMEOUT_SECONDS", "0.1");
        assert_eq!(parse_permission_timeout(), 1.0);
        restore("TOOL_PERMISSION_TIMEOUT_SECONDS", prev);
    }

    #[test]
    fn camel_workdir_takes_priority_over_cowork_workdir() {
        let settings = Settings {
            cowork_workdir: PathBuf::from("/a"),
            camel_workdir: Some(PathBuf::from("/b")),
            runtime_skills_v2: "off".to_string(),
            memory_search_past_chats: false,
            tool_permission_timeout_seconds: 120.0,
            tool_permission_default_allow: None,
            app_env: "development".to_string(),
            core_api_url: None,
            core_api_internal_key: None,
        };
        assert_eq!(settings.resolved_workdir(), std::path::Path::new("/b"));
    }

    #[test]
    fn default_allow_derives_from_development_app_env_when_unset() {
        let settings = Settings {
            cowork_workdir: PathBuf::from("/a"),
            camel_workdir: None,
            runtime_skills_v2: "off".to_string(),
            memory_search_past_chats: false,
            tool_permission_timeout_seconds: 120.0,
            tool_permission_default_allow: None,
            app_env: "development".to_string(),
            core_api_url: None,
            core_api_internal_key: None,
        };
        assert!(settings.default_tool_permission_allow());
    }

    #[test]
    fn explicit_default_allow_overrides_app_env() {
        let mut settings = Settings {
            cowork_workdir: PathBuf::from("/a"),
            camel_workdir: None,
            runtime_skills_v2: "off".to_string(),
            memory_search_past_chats: false,
            tool_permission_timeout_seconds: 120.0,
            tool_permission_default_allow: Some(false),
            app_env: "development".to_string(),
            core_api_url: None,
            core_api_internal_key: None,
        };
        assert!(!settings.default_tool_permission_allow());
        settings.tool_permission_default_allow = Some(true);
        settings.app_env = "production".to_string();
        assert!(settings.default_tool_permission_allow());
    }
}
