//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::flow::FlowKind;

/// How replies are produced for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationMode {
    /// Fixed menu-driven state machine.
    Menu,
    /// Replies delegated to a language model.
    Ai,
}

impl FromStr for ConversationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "menu" => Ok(Self::Menu),
            "ai" => Ok(Self::Ai),
            other => Err(ConfigError::InvalidValue {
                key: "INTAKE_MODE".into(),
                message: format!("expected 'menu' or 'ai', got '{other}'"),
            }),
        }
    }
}

impl std::fmt::Display for ConversationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Menu => write!(f, "menu"),
            Self::Ai => write!(f, "ai"),
        }
    }
}

/// Conversation engine configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Business name used in greetings.
    pub business_name: String,
    /// Phone number customers can call when the bot cannot help.
    pub business_phone: String,
    /// Menu state machine or AI-augmented replies.
    pub mode: ConversationMode,
    /// Which menu flow to run in `Menu` mode.
    pub flow: FlowKind,
    /// Accept `1..N` as aliases for menu options.
    pub numeric_shortcuts: bool,
    /// Text command that clears a human-takeover pause.
    pub reactivation_command: String,
    /// How long an operator message pauses automation for that user.
    pub pause_duration: Duration,
    /// How long the in-flight marker outlives a completed reply.
    pub dedup_grace: Duration,
    /// Sessions older than this are evicted.
    pub session_ttl: Duration,
    /// Interval of the expired-pause sweep.
    pub pause_sweep_interval: Duration,
    /// Interval of the stale-session sweep.
    pub session_sweep_interval: Duration,
    /// Messages kept in each session's history.
    pub history_limit: usize,
    /// Upper bound for persistence, calendar, and LLM calls.
    pub collaborator_timeout: Duration,
    /// IANA timezone label attached to calendar events.
    pub timezone: String,
    /// Minimum exchanged messages before the AI mode saves an intake.
    pub ai_min_messages: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            business_name: "Artestofados".to_string(),
            business_phone: "(83) 3241-1234".to_string(),
            mode: ConversationMode::Menu,
            flow: FlowKind::Workshop,
            numeric_shortcuts: true,
            reactivation_command: "#ativar".to_string(),
            pause_duration: Duration::from_secs(2 * 3600),
            dedup_grace: Duration::from_secs(2),
            session_ttl: Duration::from_secs(24 * 3600),
            pause_sweep_interval: Duration::from_secs(600), // 10 minutes
            session_sweep_interval: Duration::from_secs(3600),
            history_limit: 10,
            collaborator_timeout: Duration::from_secs(10),
            timezone: "America/Sao_Paulo".to_string(),
            ai_min_messages: 3,
        }
    }
}

impl BotConfig {
    /// Build config from `INTAKE_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let mode = match std::env::var("INTAKE_MODE") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.mode,
        };
        let flow = match std::env::var("INTAKE_FLOW") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.flow,
        };

        Ok(Self {
            business_name: std::env::var("EMPRESA_NOME").unwrap_or(defaults.business_name),
            business_phone: std::env::var("EMPRESA_TELEFONE").unwrap_or(defaults.business_phone),
            mode,
            flow,
            numeric_shortcuts: env_parse("INTAKE_NUMERIC_SHORTCUTS", defaults.numeric_shortcuts)?,
            reactivation_command: std::env::var("INTAKE_REACTIVATION_COMMAND")
                .map(|c| c.trim().to_lowercase())
                .unwrap_or(defaults.reactivation_command),
            pause_duration: env_secs("INTAKE_PAUSE_SECS", defaults.pause_duration)?,
            dedup_grace: Duration::from_millis(env_parse(
                "INTAKE_DEDUP_GRACE_MS",
                defaults.dedup_grace.as_millis() as u64,
            )?),
            session_ttl: env_secs("INTAKE_SESSION_TTL_SECS", defaults.session_ttl)?,
            pause_sweep_interval: env_secs(
                "INTAKE_PAUSE_SWEEP_SECS",
                defaults.pause_sweep_interval,
            )?,
            session_sweep_interval: env_secs(
                "INTAKE_SESSION_SWEEP_SECS",
                defaults.session_sweep_interval,
            )?,
            history_limit: env_parse("INTAKE_HISTORY_LIMIT", defaults.history_limit)?,
            collaborator_timeout: env_secs(
                "INTAKE_COLLABORATOR_TIMEOUT_SECS",
                defaults.collaborator_timeout,
            )?,
            timezone: std::env::var("INTAKE_TIMEZONE").unwrap_or(defaults.timezone),
            ai_min_messages: env_parse("INTAKE_AI_MIN_MESSAGES", defaults.ai_min_messages)?,
        })
    }
}

/// Which inbound transport the binary runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Z-API webhook + HTTP sender.
    Whatsapp,
    /// stdin/stdout REPL.
    Cli,
}

/// Process-level settings for the binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub channel: ChannelKind,
    /// Directory for rolling log files; stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let channel = match std::env::var("INTAKE_CHANNEL").as_deref() {
            Ok("cli") => ChannelKind::Cli,
            Ok("whatsapp") | Err(_) => ChannelKind::Whatsapp,
            Ok(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "INTAKE_CHANNEL".into(),
                    message: format!("expected 'whatsapp' or 'cli', got '{other}'"),
                });
            }
        };

        Ok(Self {
            port: env_parse("PORT", 4000)?,
            db_path: std::env::var("INTAKE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/intake.db")),
            channel,
            log_dir: std::env::var("INTAKE_LOG_DIR").ok().map(PathBuf::from),
        })
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse '{raw}'"),
        }),
        Err(_) => Ok(default),
    }
}

fn env_secs(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    env_parse(key, default.as_secs()).map(Duration::from_secs)
}
