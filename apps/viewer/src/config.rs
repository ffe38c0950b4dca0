use std::{collections::HashMap, fs};

use shared::query::{DEFAULT_LIMIT, LIMIT_OPTIONS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: Option<String>,
    pub quiet_period_ms: u64,
    pub page_limit: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: None,
            quiet_period_ms: 400,
            page_limit: DEFAULT_LIMIT,
        }
    }
}

/// Defaults, overlaid by `viewer.toml` when present, overlaid by environment
/// variables. Malformed entries fall back silently to the previous layer.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("viewer.toml") {
        apply_file(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("SERVER_URL") {
        settings.server_url = Some(v);
    }
    if let Ok(v) = std::env::var("APP__SERVER_URL") {
        settings.server_url = Some(v);
    }

    if let Ok(v) = std::env::var("APP__QUIET_PERIOD_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.quiet_period_ms = parsed;
        }
    }

    if let Ok(v) = std::env::var("APP__PAGE_LIMIT") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.page_limit = normalize_page_limit(parsed);
        }
    }

    settings
}

pub fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.get("server_url").and_then(|v| v.as_str()) {
        settings.server_url = Some(v.to_string());
    }
    if let Some(v) = file_cfg.get("quiet_period_ms").and_then(|v| v.as_integer()) {
        if let Ok(ms) = u64::try_from(v) {
            settings.quiet_period_ms = ms;
        }
    }
    if let Some(v) = file_cfg.get("page_limit").and_then(|v| v.as_integer()) {
        if let Ok(limit) = u32::try_from(v) {
            settings.page_limit = normalize_page_limit(limit);
        }
    }
}

/// Configured limits that are not offered by the pagination control collapse
/// to the default page size.
pub fn normalize_page_limit(limit: u32) -> u32 {
    if LIMIT_OPTIONS.contains(&limit) {
        limit
    } else {
        DEFAULT_LIMIT
    }
}
