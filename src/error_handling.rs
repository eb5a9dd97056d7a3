use colored::*;
use std::fmt;

use crate::logging::{LogCategory, LogContext};

/// Failure of a single chat-completion call against one provider/model
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// HTTP 429. The manager disables the provider for the rest of the process.
    RateLimited,
    /// Request never got a response (DNS, connect, TLS, body read)
    Transport(String),
    Timeout,
    /// Non-success status other than 429
    Status { code: u16, body: String },
    /// The response carried an `error` object
    Api(String),
    /// Body was not the expected chat-completion JSON
    Parse(String),
    /// No choices in the response
    EmptyResponse,
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::RateLimited => write!(f, "rate limited (429 Too Many Requests)"),
            ProviderError::Transport(msg) => write!(f, "request failed: {}", msg),
            ProviderError::Timeout => write!(f, "request timed out"),
            ProviderError::Status { code, body } => write!(f, "HTTP {}: {}", code, body),
            ProviderError::Api(msg) => write!(f, "API error: {}", msg),
            ProviderError::Parse(msg) => write!(f, "failed to parse response: {}", msg),
            ProviderError::EmptyResponse => write!(f, "no response returned from API"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Every enabled, available provider failed for one call
#[derive(Debug, Clone)]
pub struct AllProvidersFailed {
    pub attempted: usize,
    pub last_error: Option<String>,
}

impl fmt::Display for AllProvidersFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.last_error {
            Some(last) if self.attempted > 0 => write!(
                f,
                "all {} available models failed, last error: {}",
                self.attempted, last
            ),
            _ => write!(f, "no available models (all disabled or rate limited)"),
        }
    }
}

impl std::error::Error for AllProvidersFailed {}

/// The user asked to leave while a confirmation was pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// `exit` typed at a prompt
    Exit,
    /// End of input or Ctrl+C
    Abort,
}

impl fmt::Display for SessionExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionExit::Exit => write!(f, "session exit requested"),
            SessionExit::Abort => write!(f, "session aborted"),
        }
    }
}

impl std::error::Error for SessionExit {}

/// Returns the exit request carried by an error chain, if any
pub fn session_exit(error: &anyhow::Error) -> Option<SessionExit> {
    error.downcast_ref::<SessionExit>().copied()
}

/// Error with actionable suggestions for the terminal
#[derive(Debug, Clone)]
pub struct UserFriendlyError {
    pub error_type: ErrorType,
    pub message: String,
    pub suggestions: Vec<String>,
    pub technical_details: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorType {
    Connection,
    Configuration,
    Provider,
    RateLimit,
    Execution,
    Permission,
    Timeout,
    General,
}

impl UserFriendlyError {
    pub fn new(error_type: ErrorType, message: String) -> Self {
        Self {
            error_type,
            message,
            suggestions: Vec::new(),
            technical_details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.suggestions.push(suggestion.to_string());
        self
    }

    pub fn with_suggestions(mut self, suggestions: &[&str]) -> Self {
        self.suggestions
            .extend(suggestions.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_technical_details(mut self, details: String) -> Self {
        self.technical_details = Some(details);
        self
    }

    fn title(&self) -> &'static str {
        match self.error_type {
            ErrorType::Connection => "Connection Error",
            ErrorType::Configuration => "Configuration Error",
            ErrorType::Provider => "Model Provider Error",
            ErrorType::RateLimit => "Rate Limit",
            ErrorType::Execution => "Command Error",
            ErrorType::Permission => "Permission Error",
            ErrorType::Timeout => "Timeout Error",
            ErrorType::General => "Error",
        }
    }

    /// Print to stderr and record the error category in the log
    pub fn display(&self) {
        let context = LogContext::new("error_handling")
            .with_operation(&format!("{:?}", self.error_type))
            .with_success(false);
        crate::log_error!(
            LogCategory::System,
            format!("{:?}: {}", self.error_type, self.message),
            context
        );

        eprintln!("{} {}: {}", "✗".red(), self.title().bold().red(), self.message);

        if !self.suggestions.is_empty() {
            eprintln!();
            eprintln!("{}", "Suggested solutions:".bold().yellow());
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                eprintln!("  {}. {}", (i + 1).to_string().green(), suggestion);
            }
        }

        if let Some(details) = &self.technical_details {
            eprintln!();
            eprintln!("{}", "Technical details:".dimmed());
            eprintln!("   {}", details.dimmed());
        }
    }
}

impl fmt::Display for UserFriendlyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UserFriendlyError {}

/// Map an error onto a message the operator can act on.
///
/// Typed errors are recognised first; anything else falls back to matching the message text.
pub fn enhance_error(error: &anyhow::Error) -> UserFriendlyError {
    if let Some(failed) = error.downcast_ref::<AllProvidersFailed>() {
        return UserFriendlyError::new(ErrorType::Provider, failed.to_string())
            .with_suggestions(&[
                "Run 'aiassist status' to see which models are usable",
                "Check the base_url and api_key of each provider in the config file",
                "Add another provider or model as a fallback",
            ]);
    }

    if let Some(provider_error) = error.downcast_ref::<ProviderError>() {
        return enhance_provider_error(provider_error);
    }

    let error_msg = error.to_string().to_lowercase();

    if error_msg.contains("connection refused") || error_msg.contains("failed to connect") {
        return UserFriendlyError::new(ErrorType::Connection, "Unable to reach the model endpoint".to_string())
            .with_suggestions(&[
                "Check the provider base_url in the config file",
                "Verify the network connection or the http_proxy setting",
            ])
            .with_technical_details(error.to_string());
    }

    if error_msg.contains("timeout") || error_msg.contains("timed out") {
        return UserFriendlyError::new(ErrorType::Timeout, "Request timed out".to_string())
            .with_suggestions(&[
                "Try again, the provider might be busy",
                "Raise request_timeout_secs in the config file",
            ])
            .with_technical_details(error.to_string());
    }

    if error_msg.contains("config") || error_msg.contains("toml") {
        return UserFriendlyError::new(ErrorType::Configuration, "Configuration issue detected".to_string())
            .with_suggestions(&[
                "Show the active configuration: aiassist config",
                "Print the config file location: aiassist config-path",
                "Delete the file to have a fresh default written",
            ])
            .with_technical_details(error.to_string());
    }

    if error_msg.contains("permission denied") {
        return UserFriendlyError::new(ErrorType::Permission, "Permission denied".to_string())
            .with_suggestions(&[
                "Check permissions on the config and cache directories",
                "Commands that need root must be run with sudo by the model's proposal",
            ])
            .with_technical_details(error.to_string());
    }

    if error_msg.contains("spawn") || error_msg.contains("failed to execute") {
        return UserFriendlyError::new(ErrorType::Execution, "The command could not be started".to_string())
            .with_suggestion("Make sure 'sh' is available on PATH")
            .with_technical_details(error.to_string());
    }

    UserFriendlyError::new(ErrorType::General, error.to_string())
}

fn enhance_provider_error(error: &ProviderError) -> UserFriendlyError {
    match error {
        ProviderError::RateLimited => UserFriendlyError::new(
            ErrorType::RateLimit,
            "The model provider is rate limiting requests".to_string(),
        )
        .with_suggestions(&[
            "The model stays disabled until aiassist restarts",
            "Configure a second provider to fall back on",
        ]),
        ProviderError::Timeout => UserFriendlyError::new(ErrorType::Timeout, error.to_string())
            .with_suggestion("Raise request_timeout_secs in the config file"),
        ProviderError::Transport(_) => UserFriendlyError::new(ErrorType::Connection, error.to_string())
            .with_suggestions(&[
                "Check the provider base_url in the config file",
                "Verify the network connection or the http_proxy setting",
            ]),
        ProviderError::Status { code, .. } if *code == 401 || *code == 403 => {
            UserFriendlyError::new(ErrorType::Provider, error.to_string())
                .with_suggestion("Check the api_key configured for this provider")
        }
        _ => UserFriendlyError::new(ErrorType::Provider, error.to_string()),
    }
}

pub fn display_success(message: &str) {
    println!("{} {}", "✓".green(), message.green());
}

pub fn display_warning(message: &str) {
    println!("{}", message.yellow());
}

pub fn display_info(message: &str) {
    println!("{}", message.cyan());
}

/// One row of the model status listing
pub fn display_status(component: &str, status: &str, is_healthy: bool) {
    let status_color = if is_healthy { status.green() } else { status.red() };
    println!("  {} {}: {}", if is_healthy { "●".green() } else { "○".red() }, component.bold(), status_color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_user_friendly_error_builder() {
        let error = UserFriendlyError::new(ErrorType::Configuration, "bad".to_string())
            .with_suggestion("fix it")
            .with_suggestions(&["a", "b"])
            .with_technical_details("details".to_string());

        assert_eq!(error.suggestions, vec!["fix it", "a", "b"]);
        assert_eq!(error.technical_details.as_deref(), Some("details"));
        assert_eq!(error.to_string(), "bad");
    }

    #[test]
    fn test_provider_error_display() {
        assert_eq!(
            ProviderError::Status { code: 500, body: "boom".to_string() }.to_string(),
            "HTTP 500: boom"
        );
        assert!(ProviderError::RateLimited.to_string().contains("429"));
        assert!(ProviderError::RateLimited.is_rate_limited());
        assert!(!ProviderError::Timeout.is_rate_limited());
    }

    #[test]
    fn test_all_providers_failed_display() {
        let failed = AllProvidersFailed {
            attempted: 2,
            last_error: Some("HTTP 500: boom".to_string()),
        };
        assert_eq!(failed.to_string(), "all 2 available models failed, last error: HTTP 500: boom");

        let none = AllProvidersFailed { attempted: 0, last_error: None };
        assert!(none.to_string().contains("no available models"));
    }

    #[test]
    fn test_session_exit_downcast() {
        let error = anyhow::Error::new(SessionExit::Exit);
        assert_eq!(session_exit(&error), Some(SessionExit::Exit));

        let other = anyhow!("something else");
        assert_eq!(session_exit(&other), None);
    }

    #[test]
    fn test_enhance_typed_errors() {
        let error = anyhow::Error::new(AllProvidersFailed { attempted: 1, last_error: Some("x".to_string()) });
        assert_eq!(enhance_error(&error).error_type, ErrorType::Provider);

        let error = anyhow::Error::new(ProviderError::RateLimited);
        assert_eq!(enhance_error(&error).error_type, ErrorType::RateLimit);

        let error = anyhow::Error::new(ProviderError::Status { code: 401, body: String::new() });
        let enhanced = enhance_error(&error);
        assert!(enhanced.suggestions.iter().any(|s| s.contains("api_key")));
    }

    #[test]
    fn test_enhance_message_errors() {
        assert_eq!(enhance_error(&anyhow!("Connection refused")).error_type, ErrorType::Connection);
        assert_eq!(enhance_error(&anyhow!("operation timed out")).error_type, ErrorType::Timeout);
        assert_eq!(enhance_error(&anyhow!("invalid config: max_depth")).error_type, ErrorType::Configuration);
        assert_eq!(enhance_error(&anyhow!("Permission denied (os error 13)")).error_type, ErrorType::Permission);
    }

    #[test]
    fn test_enhance_generic_error() {
        let enhanced = enhance_error(&anyhow!("weird"));
        assert_eq!(enhanced.error_type, ErrorType::General);
        assert_eq!(enhanced.message, "weird");
        assert!(enhanced.suggestions.is_empty());
    }
}
