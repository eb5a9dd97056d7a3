use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

/// Environment variable that turns on debug logging
pub const DEBUG_ENV: &str = "AIASSIST_DEBUG";

/// Privacy-preserving file logger.
///
/// Command text, questions and model replies only reach the log file in debug mode. Outside debug
/// mode entries carry outcomes, durations, exit codes and provider keys. Every message passes
/// through redaction so keys and home directories never land on disk.
pub struct PrivacyLogger {
    log_file_path: PathBuf,
    debug_mode: bool,
    writer: Arc<Mutex<Option<fs::File>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub category: LogCategory,
    pub message: String,
    pub context: Option<LogContext>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum LogCategory {
    System,
    Configuration,
    Provider,
    Execution,
    Session,
    Safety,
    Debug,
}

/// Structured fields attached to an entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogContext {
    pub component: Option<String>,
    pub operation: Option<String>,
    pub provider: Option<String>,
    pub duration_ms: Option<u64>,
    pub exit_code: Option<i32>,
    pub depth: Option<usize>,
    pub success: Option<bool>,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        Self {
            component: Some(component.to_string()),
            ..Self::default()
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = Some(provider.to_string());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }
}

struct Redactions {
    home: Regex,
    macos_home: Regex,
    bearer: Regex,
    secret_pairs: Regex,
    openai_key: Regex,
}

fn redactions() -> &'static Redactions {
    static REDACTIONS: OnceLock<Redactions> = OnceLock::new();
    REDACTIONS.get_or_init(|| Redactions {
        home: Regex::new(r"/home/[^/\s]+").expect("valid regex"),
        macos_home: Regex::new(r"/Users/[^/\s]+").expect("valid regex"),
        bearer: Regex::new(r"(?i)bearer\s+\S+").expect("valid regex"),
        secret_pairs: Regex::new(r"(?i)(api_key|token|password|secret)=\S+").expect("valid regex"),
        openai_key: Regex::new(r"sk-[A-Za-z0-9_\-]{8,}").expect("valid regex"),
    })
}

impl PrivacyLogger {
    pub fn new(debug_mode: bool) -> Result<Self> {
        let log_file_path = Self::default_log_path()?;
        Self::with_path(log_file_path, debug_mode)
    }

    pub fn with_path(log_file_path: PathBuf, debug_mode: bool) -> Result<Self> {
        if let Some(parent) = log_file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(Self {
            log_file_path,
            debug_mode,
            writer: Arc::new(Mutex::new(None)),
        })
    }

    pub fn log_error(&self, category: LogCategory, message: String, context: Option<LogContext>) -> Result<()> {
        self.write(LogLevel::Error, category, &message, context)
    }

    pub fn log_warning(&self, category: LogCategory, message: String, context: Option<LogContext>) -> Result<()> {
        self.write(LogLevel::Warning, category, &message, context)
    }

    pub fn log_info(&self, category: LogCategory, message: String, context: Option<LogContext>) -> Result<()> {
        self.write(LogLevel::Info, category, &message, context)
    }

    /// Only written in debug mode; may carry command text and model replies
    pub fn log_debug(&self, category: LogCategory, message: String, context: Option<LogContext>) -> Result<()> {
        if !self.debug_mode {
            return Ok(());
        }
        self.write(LogLevel::Debug, category, &format!("[DEBUG] {}", message), context)
    }

    pub fn log_startup(&self, version: &str) -> Result<()> {
        let context = LogContext::new("system").with_operation("startup");
        self.log_info(
            LogCategory::System,
            format!(
                "aiassist {} started on {} {}",
                version,
                std::env::consts::OS,
                std::env::consts::ARCH
            ),
            Some(context),
        )
    }

    /// One provider attempt inside a fallback call
    pub fn log_provider_attempt(&self, provider: &str, duration_ms: u64, outcome: &str, success: bool) -> Result<()> {
        let context = LogContext::new("provider")
            .with_operation("chat_completion")
            .with_provider(provider)
            .with_duration_ms(duration_ms)
            .with_success(success);

        let level = if success { LogLevel::Info } else { LogLevel::Warning };
        self.write(
            level,
            LogCategory::Provider,
            &format!("Provider {}: {} ({}ms)", provider, outcome, duration_ms),
            Some(context),
        )
    }

    /// Outcome of a shell command. The command text itself is only logged at debug level.
    pub fn log_command_execution(&self, kind: &str, exit_code: Option<i32>, duration_ms: u64, output_chars: usize) -> Result<()> {
        let success = exit_code == Some(0);
        let context = LogContext::new("runner")
            .with_operation(kind)
            .with_exit_code(exit_code)
            .with_duration_ms(duration_ms)
            .with_success(success);

        let status = exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        self.write(
            if success { LogLevel::Info } else { LogLevel::Warning },
            LogCategory::Execution,
            &format!("{} command finished with status {} ({} chars of output)", kind, status, output_chars),
            Some(context),
        )
    }

    pub fn log_safety_event(&self, event: &str, details: &str) -> Result<()> {
        let context = LogContext::new("safety").with_operation(event);
        self.write(
            LogLevel::Warning,
            LogCategory::Safety,
            &format!("Safety event {}: {}", event, details),
            Some(context),
        )
    }

    pub fn is_debug_mode(&self) -> bool {
        self.debug_mode
    }

    pub fn log_path(&self) -> &PathBuf {
        &self.log_file_path
    }

    pub fn clear_logs(&self) -> Result<()> {
        {
            let mut writer = self
                .writer
                .lock()
                .map_err(|_| anyhow!("Failed to acquire log writer lock"))?;
            *writer = None;
        }

        if self.log_file_path.exists() {
            fs::remove_file(&self.log_file_path)?;
        }

        self.log_info(LogCategory::System, "Log file cleared".to_string(), None)
    }

    fn write(&self, level: LogLevel, category: LogCategory, message: &str, context: Option<LogContext>) -> Result<()> {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            category,
            message: redact(message),
            context,
        };
        self.write_log_entry(&entry)
    }

    fn write_log_entry(&self, entry: &LogEntry) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("Failed to acquire log writer lock"))?;

        if writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_file_path)?;
            *writer = Some(file);
        }

        if let Some(file) = writer.as_mut() {
            writeln!(file, "{}", format_log_entry(entry))?;
            file.flush()?;
        }

        Ok(())
    }

    fn default_log_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir().ok_or_else(|| anyhow!("Could not find config directory"))?;
        path.push("aiassist");
        path.push("aiassist.log");
        Ok(path)
    }
}

fn format_log_entry(entry: &LogEntry) -> String {
    let mut formatted = format!(
        "[{}] {} {} {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        format!("{:?}", entry.level).to_uppercase(),
        format!("{:?}", entry.category).to_uppercase(),
        entry.message
    );

    if let Some(context) = &entry.context {
        let mut parts = Vec::new();
        if let Some(component) = &context.component {
            parts.push(format!("component={}", component));
        }
        if let Some(operation) = &context.operation {
            parts.push(format!("operation={}", operation));
        }
        if let Some(provider) = &context.provider {
            parts.push(format!("provider={}", provider));
        }
        if let Some(duration) = context.duration_ms {
            parts.push(format!("duration={}ms", duration));
        }
        if let Some(code) = context.exit_code {
            parts.push(format!("exit={}", code));
        }
        if let Some(depth) = context.depth {
            parts.push(format!("depth={}", depth));
        }
        if let Some(success) = context.success {
            parts.push(format!("success={}", success));
        }
        if !parts.is_empty() {
            formatted.push_str(&format!(" [{}]", parts.join(", ")));
        }
    }

    formatted
}

/// Scrub secrets and user names from a message
pub fn redact(message: &str) -> String {
    let r = redactions();
    let redacted = r.home.replace_all(message, "/home/[USER]");
    let redacted = r.macos_home.replace_all(&redacted, "/Users/[USER]");
    let redacted = r.bearer.replace_all(&redacted, "Bearer [REDACTED]");
    let redacted = r.secret_pairs.replace_all(&redacted, "$1=[REDACTED]");
    let redacted = r.openai_key.replace_all(&redacted, "sk-[REDACTED]");
    redacted.into_owned()
}

static GLOBAL_LOGGER: OnceLock<Arc<Mutex<PrivacyLogger>>> = OnceLock::new();

/// Initialize the global logger. Debug mode follows `AIASSIST_DEBUG`.
pub fn init_logger() -> Result<()> {
    let debug = std::env::var(DEBUG_ENV)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    let logger = PrivacyLogger::new(debug)?;
    let _ = GLOBAL_LOGGER.set(Arc::new(Mutex::new(logger)));
    Ok(())
}

pub fn get_logger() -> Result<Arc<Mutex<PrivacyLogger>>> {
    GLOBAL_LOGGER
        .get()
        .cloned()
        .ok_or_else(|| anyhow!("Logger not initialized. Call init_logger() first."))
}

/// Run `f` against the global logger if it is initialized; logging failures are ignored
pub fn with_logger<F>(f: F)
where
    F: FnOnce(&PrivacyLogger) -> Result<()>,
{
    if let Ok(logger) = get_logger() {
        if let Ok(guard) = logger.lock() {
            let _ = f(&guard);
        }
    }
}

#[macro_export]
macro_rules! log_error {
    ($category:expr, $message:expr) => {
        $crate::logging::with_logger(|l| l.log_error($category, $message.to_string(), None))
    };
    ($category:expr, $message:expr, $context:expr) => {
        $crate::logging::with_logger(|l| l.log_error($category, $message.to_string(), Some($context)))
    };
}

#[macro_export]
macro_rules! log_warning {
    ($category:expr, $message:expr) => {
        $crate::logging::with_logger(|l| l.log_warning($category, $message.to_string(), None))
    };
    ($category:expr, $message:expr, $context:expr) => {
        $crate::logging::with_logger(|l| l.log_warning($category, $message.to_string(), Some($context)))
    };
}

#[macro_export]
macro_rules! log_info {
    ($category:expr, $message:expr) => {
        $crate::logging::with_logger(|l| l.log_info($category, $message.to_string(), None))
    };
    ($category:expr, $message:expr, $context:expr) => {
        $crate::logging::with_logger(|l| l.log_info($category, $message.to_string(), Some($context)))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($category:expr, $message:expr) => {
        $crate::logging::with_logger(|l| l.log_debug($category, $message.to_string(), None))
    };
}
