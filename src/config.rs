use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Finished tasks stay listed (and in memory) this long.
    pub history_retention_hours: u64,
    /// Default number of history entries returned by `GET /scan-tasks`.
    pub history_limit: usize,
    pub max_history_limit: usize,
    /// Capacity of the task event broadcast channel.
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub run_on_startup: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// File extensions (without dot, case-insensitive) treated as chapters.
    pub extensions: Vec<String>,
    /// Glob patterns matched against paths relative to a scan path.
    pub excludes: Vec<String>,
    pub follow_symlinks: bool,
    pub metadata_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_seconds: u64,
    pub scan_requests_per_minute: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    pub enable_hsts: Option<bool>,
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub csp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
    pub scanner: ScannerConfig,
    pub rate_limit: RateLimitConfig,
    pub security: Option<SecurityConfig>,
}

const DEFAULTS: &str = include_str!("../config/default.toml");

/// Upper bound for `queue.history_retention_hours`.
pub const MAX_RETENTION_HOURS: u64 = 24 * 365 * 10;

impl Default for AppConfig {
    fn default() -> Self {
        // The embedded file is part of the binary; failing to parse it is a build defect.
        match ::config::Config::builder()
            .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
            .build()
            .and_then(|cfg| cfg.try_deserialize())
        {
            Ok(app_cfg) => app_cfg,
            Err(e) => panic!("embedded default config is invalid: {}", e),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        // Mirror defaults from config/default.toml
        Self { history_retention_hours: 24, history_limit: 50, max_history_limit: 500, event_buffer: 256 }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        // Mirror defaults from config/default.toml
        Self {
            extensions: ["cbz", "cbr", "cb7", "zip", "rar", "7z", "epub", "pdf", "txt"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            excludes: vec![
                "**/.*".into(),
                "**/.*/**".into(),
                "**/@eaDir/**".into(),
                "**/__MACOSX/**".into(),
            ],
            follow_symlinks: false,
            metadata_file: "info.json".into(),
        }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
        // Optional local file: leseecke.toml (in CWD)
        .add_source(::config::File::with_name("leseecke").required(false));

    if let Ok(custom_path) = std::env::var("LESEECKE_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(
        ::config::Environment::with_prefix("LESEECKE")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("scanner.extensions")
            .with_list_parse_key("scanner.excludes")
            .try_parsing(true),
    );

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Server
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }

    // Queue
    if cfg.queue.history_retention_hours == 0 || cfg.queue.history_retention_hours > MAX_RETENTION_HOURS {
        return Err(anyhow::anyhow!(
            "queue.history_retention_hours must be in 1..={} (ten years)",
            MAX_RETENTION_HOURS
        ));
    }
    if cfg.queue.max_history_limit == 0 {
        return Err(anyhow::anyhow!("queue.max_history_limit must be > 0"));
    }
    if cfg.queue.history_limit == 0 || cfg.queue.history_limit > cfg.queue.max_history_limit {
        return Err(anyhow::anyhow!("queue.history_limit must be in 1..=queue.max_history_limit"));
    }
    if cfg.queue.event_buffer == 0 {
        return Err(anyhow::anyhow!("queue.event_buffer must be > 0"));
    }

    // Scheduler
    if cfg.scheduler.enabled && cfg.scheduler.interval_secs < 10 {
        return Err(anyhow::anyhow!("scheduler.interval_secs must be >= 10"));
    }

    // Scanner
    if cfg.scanner.extensions.iter().all(|e| e.trim().is_empty()) {
        return Err(anyhow::anyhow!("scanner.extensions must not be empty"));
    }
    for pat in &cfg.scanner.excludes {
        globset::Glob::new(pat.trim())
            .map_err(|e| anyhow::anyhow!("invalid scanner.excludes pattern {:?}: {}", pat, e))?;
    }
    if cfg.scanner.metadata_file.trim().is_empty() {
        return Err(anyhow::anyhow!("scanner.metadata_file must not be empty"));
    }

    // Rate limiting
    if cfg.rate_limit.max_requests == 0 || cfg.rate_limit.window_seconds == 0 {
        return Err(anyhow::anyhow!("rate_limit.max_requests and rate_limit.window_seconds must be > 0"));
    }
    if cfg.rate_limit.scan_requests_per_minute == 0 {
        return Err(anyhow::anyhow!("rate_limit.scan_requests_per_minute must be > 0"));
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        // sqlite:///C:/... on Windows: drop the leading '/' before a drive letter
        #[cfg(windows)]
        let path = {
            let bytes = path.as_bytes();
            if bytes.len() >= 3 && bytes[0] == b'/' && bytes[2] == b':' && bytes[1].is_ascii_alphabetic() {
                &path[1..]
            } else {
                path
            }
        };
        if path.starts_with(":memory:") {
            return Ok(());
        }
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}
