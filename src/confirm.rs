use anyhow::Result;
use async_trait::async_trait;
use colored::*;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use tokio_util::sync::CancellationToken;

use crate::commands::{Command, CommandKind};
use crate::error_handling::SessionExit;
use crate::i18n::I18n;

/// Line-oriented user input
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Show `prompt` and read one line. `Ok(None)` means end of input.
    async fn read_line(&self, prompt: &str) -> Result<Option<String>>;
}

/// Ask a yes/no question. `y`/`yes` approve, `exit` leaves the session, end of input aborts it.
pub async fn ask_yes_no(prompter: &dyn Prompter, prompt: &str) -> Result<bool> {
    let Some(answer) = prompter.read_line(prompt).await? else {
        return Err(SessionExit::Abort.into());
    };

    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Ok(true),
        "exit" => Err(SessionExit::Exit.into()),
        _ => Ok(false),
    }
}

/// Reads from the controlling terminal, falling back to stdin.
///
/// Reads block a worker thread; the cancellation token abandons the read so Ctrl+C is honoured
/// even while waiting for input.
pub struct TerminalPrompter {
    cancel: CancellationToken,
}

impl TerminalPrompter {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn read_line(&self, prompt: &str) -> Result<Option<String>> {
        if self.cancel.is_cancelled() {
            return Err(SessionExit::Abort.into());
        }

        print!("{}", prompt.yellow());
        io::stdout().flush()?;

        let read = tokio::task::spawn_blocking(read_terminal_line);
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SessionExit::Abort.into()),
            line = read => Ok(line??),
        }
    }
}

fn read_terminal_line() -> io::Result<Option<String>> {
    match File::open("/dev/tty") {
        Ok(tty) => read_line_lossy(&mut BufReader::new(tty)),
        Err(_) => read_line_lossy(&mut io::stdin().lock()),
    }
}

/// One line with invalid UTF-8 replaced rather than rejected
fn read_line_lossy(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf)? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(&buf);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Shows a proposed command and collects approval: once for a query, twice for a modify
pub struct ConfirmationGate<'a> {
    prompter: &'a dyn Prompter,
    i18n: &'a I18n,
}

impl<'a> ConfirmationGate<'a> {
    pub fn new(prompter: &'a dyn Prompter, i18n: &'a I18n) -> Self {
        Self { prompter, i18n }
    }

    pub async fn confirm(&self, command: &Command) -> Result<bool> {
        println!();
        match command.kind {
            CommandKind::Query => {
                println!("{}", self.i18n.t("executor.query_command").green());
                println!("{}", command.text.green().bold());
            }
            CommandKind::Modify => {
                println!("{}", self.i18n.t("executor.modify_command").red());
                println!("{}", command.text.red().bold());
            }
        }

        if !ask_yes_no(self.prompter, &self.i18n.t("executor.execute_prompt")).await? {
            return Ok(false);
        }
        if command.is_modify() {
            return ask_yes_no(self.prompter, &self.i18n.t("executor.modify_warning")).await;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::session_exit;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedPrompter {
        answers: Mutex<VecDeque<Option<&'static str>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedPrompter {
        fn new(answers: &[Option<&'static str>]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().copied().collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn asked(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Prompter for ScriptedPrompter {
        async fn read_line(&self, prompt: &str) -> Result<Option<String>> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.answers.lock().unwrap().pop_front().flatten().map(str::to_string))
        }
    }

    #[tokio::test]
    async fn test_yes_no_answers() {
        for (answer, expected) in [("y", true), ("YES", true), (" y ", true), ("n", false), ("", false), ("sure", false)] {
            let prompter = ScriptedPrompter::new(&[Some(answer)]);
            assert_eq!(ask_yes_no(&prompter, "?").await.unwrap(), expected, "{:?}", answer);
        }
    }

    #[tokio::test]
    async fn test_exit_and_eof() {
        let prompter = ScriptedPrompter::new(&[Some("Exit")]);
        let error = ask_yes_no(&prompter, "?").await.unwrap_err();
        assert_eq!(session_exit(&error), Some(SessionExit::Exit));

        let prompter = ScriptedPrompter::new(&[None]);
        let error = ask_yes_no(&prompter, "?").await.unwrap_err();
        assert_eq!(session_exit(&error), Some(SessionExit::Abort));
    }

    #[tokio::test]
    async fn test_query_needs_one_confirmation() {
        let i18n = I18n::default();
        let prompter = ScriptedPrompter::new(&[Some("y")]);
        let gate = ConfirmationGate::new(&prompter, &i18n);

        assert!(gate.confirm(&Command::query("df -h")).await.unwrap());
        assert_eq!(prompter.asked(), 1);
    }

    #[tokio::test]
    async fn test_modify_needs_two_confirmations() {
        let i18n = I18n::default();
        let prompter = ScriptedPrompter::new(&[Some("y"), Some("y")]);
        let gate = ConfirmationGate::new(&prompter, &i18n);

        assert!(gate.confirm(&Command::modify("systemctl restart nginx")).await.unwrap());
        let prompts = prompter.prompts.lock().unwrap().clone();
        assert_eq!(prompts, vec![i18n.t("executor.execute_prompt"), i18n.t("executor.modify_warning")]);
    }

    #[tokio::test]
    async fn test_modify_declined_at_second_prompt() {
        let i18n = I18n::default();
        let prompter = ScriptedPrompter::new(&[Some("y"), Some("n")]);
        let gate = ConfirmationGate::new(&prompter, &i18n);

        assert!(!gate.confirm(&Command::modify("rm -rf /tmp/x")).await.unwrap());
        assert_eq!(prompter.asked(), 2);
    }

    #[tokio::test]
    async fn test_first_decline_short_circuits() {
        let i18n = I18n::default();
        let prompter = ScriptedPrompter::new(&[Some("n"), Some("y")]);
        let gate = ConfirmationGate::new(&prompter, &i18n);

        assert!(!gate.confirm(&Command::modify("reboot")).await.unwrap());
        assert_eq!(prompter.asked(), 1);
    }

    #[test]
    fn test_line_with_invalid_utf8_is_kept() {
        let mut input = io::Cursor::new(b"y\xff\xfe\nsecond\r\n".to_vec());
        assert_eq!(read_line_lossy(&mut input).unwrap().as_deref(), Some("y\u{fffd}\u{fffd}"));
        assert_eq!(read_line_lossy(&mut input).unwrap().as_deref(), Some("second"));
        assert_eq!(read_line_lossy(&mut input).unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancelled_terminal_prompter_aborts() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let prompter = TerminalPrompter::new(cancel);

        let error = prompter.read_line("> ").await.unwrap_err();
        assert_eq!(session_exit(&error), Some(SessionExit::Abort));
    }
}
