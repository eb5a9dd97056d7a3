use anyhow::Result;
use colored::*;
use tokio_util::sync::CancellationToken;

use crate::blacklist::Blacklist;
use crate::commands::{extract_commands, Command};
use crate::config::Config;
use crate::confirm::{ConfirmationGate, Prompter};
use crate::error_handling::{display_info, display_success, display_warning, enhance_error, session_exit};
use crate::execution::ShellRunner;
use crate::i18n::I18n;
use crate::logging::{LogCategory, LogContext};
use crate::prompts::{PromptKind, Prompts};
use crate::providers::{ProviderManager, Reply};
use crate::spinner::Spinner;
use crate::truncate::truncate_output;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Environment facts, rendered without a label
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
}

impl SessionMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// What came back from running one approved command
struct CommandOutcome {
    output: String,
    error: Option<String>,
}

/// One conversation: question, model answer, confirmation, execution, re-analysis.
///
/// The history lives only in memory. Every model call sends the whole history flattened into
/// one user message together with the system prompt for the current stage.
pub struct Session {
    manager: ProviderManager,
    prompter: Box<dyn Prompter>,
    runner: Box<dyn ShellRunner>,
    blacklist: Blacklist,
    prompts: Prompts,
    i18n: I18n,
    cancel: CancellationToken,
    history: Vec<SessionMessage>,
    max_depth: usize,
    command_output_limit: usize,
    pipe_input_limit: usize,
    default_model: Option<String>,
}

impl Session {
    pub fn new(
        config: &Config,
        manager: ProviderManager,
        prompter: Box<dyn Prompter>,
        runner: Box<dyn ShellRunner>,
        system_facts: Option<String>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let blacklist = Blacklist::new(&config.blacklist)?;
        let language = config.language();

        let history = system_facts
            .into_iter()
            .map(|facts| SessionMessage::new(Role::System, facts))
            .collect();

        Ok(Self {
            manager,
            prompter,
            runner,
            prompts: Prompts::new(language, &blacklist),
            blacklist,
            i18n: I18n::new(language),
            cancel,
            history,
            max_depth: config.max_depth,
            command_output_limit: config.command_output_limit,
            pipe_input_limit: config.pipe_input_limit,
            default_model: config.default_model.clone(),
        })
    }

    pub fn history(&self) -> &[SessionMessage] {
        &self.history
    }

    pub fn manager(&self) -> &ProviderManager {
        &self.manager
    }

    /// Drop the conversation, keeping the environment facts
    pub fn clear(&mut self) {
        self.history.retain(|m| m.role == Role::System);
    }

    /// Flatten the history into the text sent to the model
    pub fn render_context(&self) -> String {
        let user = self.i18n.t("interactive.user_label");
        let ai = self.i18n.t("interactive.ai_label");

        let mut context = String::new();
        for message in &self.history {
            match message.role {
                Role::System => {
                    context.push_str(&message.content);
                    context.push('\n');
                }
                Role::User => context.push_str(&format!("[{}]: {}\n\n", user, message.content)),
                Role::Assistant => context.push_str(&format!("[{}]: {}\n\n", ai, message.content)),
            }
        }
        context
    }

    /// Interactive loop. Returns when the user leaves; a `SessionExit` error means an abort
    /// or an `exit` typed at a confirmation prompt.
    pub async fn run(&mut self, initial_question: Option<String>) -> Result<()> {
        self.print_banner();

        let mut pending = initial_question.filter(|q| !q.trim().is_empty());
        loop {
            let input = match pending.take() {
                Some(question) => {
                    println!("{}{}", self.i18n.t("interactive.input_prompt").yellow(), question);
                    question
                }
                None => match self.prompter.read_line(&self.i18n.t("interactive.input_prompt")).await? {
                    Some(line) => line,
                    None => break,
                },
            };

            let input = input.trim();
            match input {
                "" => continue,
                "exit" | "quit" => break,
                "help" => self.print_help(),
                "history" => self.print_history(),
                "status" => self
                    .manager
                    .display_status(&self.i18n, self.default_model.as_deref()),
                "clear" => {
                    self.clear();
                    display_success(&self.i18n.t("interactive.cleared"));
                }
                question => {
                    if let Err(e) = self.ask(question).await {
                        if session_exit(&e).is_some() {
                            return Err(e);
                        }
                        enhance_error(&e).display();
                    }
                }
            }
        }

        println!("{}", self.i18n.t("interactive.goodbye").cyan());
        Ok(())
    }

    /// One question: ask the model, then work through the commands it proposes
    pub async fn ask(&mut self, question: &str) -> Result<()> {
        crate::log_debug!(LogCategory::Session, format!("question: {}", question));
        self.history.push(SessionMessage::new(Role::User, question));

        let context = self.render_context();
        let reply = match self.call_model(PromptKind::Interactive, &context).await {
            Ok(reply) => reply,
            Err(e) => {
                self.history.pop();
                return Err(e);
            }
        };

        self.history.push(SessionMessage::new(Role::Assistant, reply.text.clone()));
        self.print_reply(&reply);

        let commands = extract_commands(&reply.text);
        if commands.is_empty() {
            return Ok(());
        }
        self.drive_commands(commands).await
    }

    /// Bounded confirm, execute, re-analyse loop.
    ///
    /// The first batch comes from the answer to the question and counts as depth 1; each batch
    /// proposed by a follow-up analysis adds one. Only the first approved command of a batch runs.
    async fn drive_commands(&mut self, mut batch: Vec<Command>) -> Result<()> {
        let mut depth = 1;

        loop {
            let Some(command) = self.select_command(&batch).await? else {
                display_success(&self.i18n.t("interactive.analysis_complete"));
                return Ok(());
            };

            let outcome = self.execute(&command).await?;
            let message = self.execution_message(&command, &outcome);
            self.history.push(SessionMessage::new(Role::User, message));

            let context = format!("{}\n{}", self.render_context(), self.i18n.t("interactive.continue_analysis"));
            let reply = self.call_model(PromptKind::ContinueAnalysis, &context).await?;
            self.history.push(SessionMessage::new(Role::Assistant, reply.text.clone()));
            self.print_reply(&reply);

            batch = extract_commands(&reply.text);
            if batch.is_empty() {
                return Ok(());
            }

            depth += 1;
            if depth > self.max_depth {
                display_warning(&self.i18n.t("executor.max_depth_reached"));
                crate::log_warning!(
                    LogCategory::Session,
                    "Command analysis depth limit reached",
                    LogContext::new("session").with_depth(self.max_depth)
                );
                return Ok(());
            }
        }
    }

    /// First command of the batch the user approves. Blacklisted commands are refused outright.
    async fn select_command(&self, batch: &[Command]) -> Result<Option<Command>> {
        let gate = ConfirmationGate::new(&*self.prompter, &self.i18n);

        for command in batch {
            if let Some(rule) = self.blacklist.matching_rule(&command.text) {
                println!();
                println!("{}", command.text.red());
                println!("{}", self.i18n.tf("executor.blacklisted", &[&rule]).red());
                display_info(&self.i18n.t("executor.blacklist_hint"));
                crate::logging::with_logger(|l| {
                    l.log_safety_event("blacklist_rejection", &format!("{} command matched rule '{}'", command.kind, rule))
                });
                continue;
            }

            if gate.confirm(command).await? {
                return Ok(Some(command.clone()));
            }
            println!("{}", self.i18n.t("executor.skipped").yellow());
        }

        Ok(None)
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome> {
        crate::log_debug!(LogCategory::Execution, format!("executing: {}", command.text));
        println!();

        let spinner = Spinner::start(&self.i18n.t("executor.executing"))?;
        let result = self.runner.execute(&command.text, &self.cancel).await;
        spinner.stop().await;

        let (raw_output, error) = match result {
            Ok(result) => {
                crate::logging::with_logger(|l| {
                    l.log_command_execution(
                        &command.kind.to_string(),
                        result.exit_code,
                        result.duration.as_millis() as u64,
                        result.output.chars().count(),
                    )
                });

                if !result.output.is_empty() {
                    print!("{}", result.output);
                    if !result.output.ends_with('\n') {
                        println!();
                    }
                }
                match result.error_message() {
                    None => display_success(&self.i18n.t("executor.execute_success")),
                    Some(ref e) => println!("{}", self.i18n.tf("executor.execute_failed", &[e]).red()),
                }
                let error = result.error_message();
                (result.output, error)
            }
            Err(e) if session_exit(&e).is_some() => return Err(e),
            Err(e) => {
                println!("{}", self.i18n.tf("executor.execute_failed", &[&e]).red());
                crate::log_error!(
                    LogCategory::Execution,
                    format!("{} command could not be started: {}", command.kind, e),
                    LogContext::new("runner").with_operation("spawn")
                );
                (String::new(), Some(e.to_string()))
            }
        };

        let output = if raw_output.trim().is_empty() {
            self.i18n.t("executor.no_output")
        } else {
            truncate_output(&raw_output, self.command_output_limit, &self.i18n)
        };

        Ok(CommandOutcome { output, error })
    }

    fn execution_message(&self, command: &Command, outcome: &CommandOutcome) -> String {
        let mut message = format!(
            "[{}]\n{}\n\n[{}]\n{}",
            self.i18n.t("interactive.executed_command"),
            command.text,
            self.i18n.t("interactive.execution_output"),
            outcome.output
        );
        if let Some(error) = &outcome.error {
            message.push_str(&format!("\n\n[{}]\n{}", self.i18n.t("interactive.execution_error"), error));
        }
        message
    }

    /// Single-shot analysis of piped data; proposed commands are listed, never run
    pub async fn analyze_pipe(&mut self, question: Option<&str>, data: &str) -> Result<()> {
        let question = question
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.i18n.t("interactive.pipe_default_question"));
        let data = truncate_output(data, self.pipe_input_limit, &self.i18n);

        let content = format!(
            "{}{}{}\n\n{}\n{}",
            self.render_context(),
            self.i18n.t("interactive.pipe_user_question"),
            question,
            self.i18n.t("interactive.pipe_data"),
            data
        );

        let reply = self.call_model(PromptKind::PipeAnalysis, &content).await?;
        self.print_reply(&reply);

        let commands = extract_commands(&reply.text);
        if !commands.is_empty() {
            println!("{}", self.i18n.t("executor.proposed").bold());
            for command in commands {
                println!("  [{}] {}", command.kind, command.text.green());
            }
        }
        Ok(())
    }

    async fn call_model(&self, kind: PromptKind, content: &str) -> Result<Reply> {
        let system_prompt = self.prompts.get(kind);

        let spinner = Spinner::start(&self.i18n.t("interactive.thinking"))?;
        let result = self
            .manager
            .call_with_fallback(&self.cancel, &system_prompt, content)
            .await;
        spinner.stop().await;

        let reply = result?;
        for (key, error) in &reply.failures {
            display_warning(&self.i18n.tf("llm.fallback_warning", &[key, error]));
        }
        crate::log_debug!(LogCategory::Session, format!("reply from {}: {}", reply.key, reply.text));
        Ok(reply)
    }

    fn print_reply(&self, reply: &Reply) {
        println!();
        println!("{}", format!("[{}]", reply.key).dimmed());
        println!("{}", reply.text.cyan());
        println!();
    }

    fn print_banner(&self) {
        let separator = "─".repeat(60);
        println!("{}", separator.cyan());
        println!("{}", self.i18n.t("interactive.welcome").cyan().bold());
        println!("{}", self.i18n.t("interactive.help_hint").cyan());
        println!("{}", separator.cyan());
        self.manager
            .display_status(&self.i18n, self.default_model.as_deref());
        println!();
    }

    fn print_help(&self) {
        println!();
        println!("{}", self.i18n.t("interactive.help_title").bold());
        for key in ["help_history", "help_status", "help_clear", "help_exit"] {
            println!("{}", self.i18n.t(&format!("interactive.{}", key)));
        }
        println!();
        println!("{}", self.i18n.t("interactive.help_examples").bold());
        for key in ["help_ex1", "help_ex2", "help_ex3"] {
            println!("{}", self.i18n.t(&format!("interactive.{}", key)));
        }
        println!();
    }

    fn print_history(&self) {
        let turns: Vec<&SessionMessage> = self.history.iter().filter(|m| m.role != Role::System).collect();
        if turns.is_empty() {
            display_info(&self.i18n.t("interactive.history_empty"));
            return;
        }

        println!();
        println!("{}", self.i18n.t("interactive.history_title").cyan().bold());
        for message in turns {
            match message.role {
                Role::User => println!("{}: {}", self.i18n.t("interactive.user_label").yellow(), message.content),
                _ => println!("{}: {}", self.i18n.t("interactive.ai_label").cyan(), message.content),
            }
        }
        println!();
    }
}
