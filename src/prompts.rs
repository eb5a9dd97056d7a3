use crate::blacklist::Blacklist;
use crate::i18n::Language;

const BLACKLIST_PLACEHOLDER: &str = "{{COMMAND_BLACKLIST}}";

const BLACKLIST_SECTION: &str = "
[Command Blacklist]:
{{COMMAND_BLACKLIST}}
These commands are rejected before execution. Prefer alternatives. If one of them is truly
required, tell the user it is blacklisted, that running it will be refused, and how they could
get permission or work around it. Never assume a blacklisted command ran.
";

const CLASSIFICATION: &str = "
[Command Classification]:
Judge each command by what it actually does.
[cmd:query] - only reads or displays information; the system is unchanged afterwards and the
command can be repeated without side effects. Examples: ls, cat, df, free, ps, grep, find, stat,
uname, systemctl status, docker ps, kubectl get, curl http://host/health
[cmd:modify] - creates, deletes, writes, installs, removes, starts, stops, restarts, kills or
otherwise changes state. Examples: rm, mv, cp, mkdir, chmod, chown, kill, apt install,
systemctl restart nginx, docker rm, echo x >> /etc/hosts
A wrong label misleads the operator: installing or restarting is never a query.
";

const COMMON_RULES: &str = "
[Rules]:
- No interactive commands (top, vim, less, more). Use batch forms such as top -bn1 on Linux or
  top -l 1 on macOS.
- Mind platform differences: macOS ps has no --sort or -e, use ps aux piped to sort.
- With ps -o, put comm or args last and add -ww so the name is not cut off.
- Plain text only: use numbers, [] and - for structure, no markdown.
- Commands must fit the current environment and run directly with minimal dependencies.
";

const INTERACTIVE: &str = "
You are a senior operations and systems engineer. You only handle server operations,
infrastructure, networking, containers, Kubernetes, cloud-native platforms, performance tuning,
log analysis, service management, security hardening, database operations, monitoring and
deployment. For anything else reply exactly: \"Not within tool scope. Server and infrastructure
operations only.\"

[Scenario]:
The user asks an operations question for the first time.

[Response Structure]:
1. Restate the question in one or two sentences.
2. Briefly analyse likely causes and the approach.
3. List one to three numbered steps, each with an explanation and one command.
   The command goes on its own line, starting with [cmd:query] or [cmd:modify] in lowercase,
   with nothing else on that line.
4. Explain how to read the results.

Example step:
1. Check total disk size. df shows filesystem usage.
[cmd:query] df -h /
";

const CONTINUE_ANALYSIS: &str = "
You are a senior operations and systems engineer analysing the output of commands the user just
ran. The conversation holds the original question, your earlier answer and the command output.

[Task]:
1. Interpret the current output: what key data does it show.
2. Relate it to the original question: is it answered, what was found.
3. Conclude or continue:
   - If the question is answered or the steps are done, summarise the conclusion and give no
     further commands.
   - Otherwise give only the next step, numbered, with an explanation and a command on its own
     line starting with [cmd:query] or [cmd:modify].
Do not repeat earlier steps. Use precise operations terminology.
";

const PIPE_ANALYSIS: &str = "
You are a senior operations and systems engineer. The user piped the output of a command
(status, logs, errors or similar) into this tool. Analyse it on its own.

[Response Structure]:
1. Summarise the output, extract key facts and name any problems with their severity. Say so
   clearly when nothing is wrong.
2. Give actionable guidance and next actions.
3. When the data is insufficient, say what else is needed and how to collect it.
Each command goes on its own line starting with [cmd:query] or [cmd:modify].
End with a note that pipe mode only analyses and recommends; it does not execute commands.
";

/// The three conversation stages that each get their own system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// First answer to a user question
    Interactive,
    /// Analysis of command output fed back into the conversation
    ContinueAnalysis,
    /// One-shot analysis of piped input
    PipeAnalysis,
}

/// System prompts with the blacklist and language instruction baked in
#[derive(Debug, Clone)]
pub struct Prompts {
    language: Language,
    blacklist_section: String,
}

impl Prompts {
    pub fn new(language: Language, blacklist: &Blacklist) -> Self {
        let blacklist_section = if blacklist.is_empty() {
            String::new()
        } else {
            BLACKLIST_SECTION.replace(BLACKLIST_PLACEHOLDER, &blacklist.format_for_prompt())
        };

        Self {
            language,
            blacklist_section,
        }
    }

    pub fn get(&self, kind: PromptKind) -> String {
        let (body, classify) = match kind {
            PromptKind::Interactive => (INTERACTIVE, true),
            PromptKind::ContinueAnalysis => (CONTINUE_ANALYSIS, true),
            PromptKind::PipeAnalysis => (PIPE_ANALYSIS, false),
        };

        let mut prompt = String::from(body);
        if classify {
            prompt.push_str(CLASSIFICATION);
        }
        prompt.push_str(&self.blacklist_section);
        prompt.push_str(COMMON_RULES);
        prompt.push_str(language_instruction(self.language));
        prompt
    }
}

fn language_instruction(language: Language) -> &'static str {
    match language {
        Language::English => "\n[Language]:\nRespond in English.\n",
        Language::Chinese => "\n[Language]:\nRespond in Simplified Chinese. Keep commands and the [cmd:...] markers exactly as written.\n",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blacklist(patterns: &[&str]) -> Blacklist {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        Blacklist::new(&patterns).unwrap()
    }

    #[test]
    fn test_every_prompt_mentions_markers() {
        let prompts = Prompts::new(Language::English, &Blacklist::default());
        for kind in [PromptKind::Interactive, PromptKind::ContinueAnalysis, PromptKind::PipeAnalysis] {
            let prompt = prompts.get(kind);
            assert!(prompt.contains("[cmd:query]"), "{:?}", kind);
            assert!(prompt.contains("[cmd:modify]"), "{:?}", kind);
        }
    }

    #[test]
    fn test_blacklist_is_substituted() {
        let prompts = Prompts::new(Language::English, &blacklist(&["rm -rf *", "mkfs*"]));
        let prompt = prompts.get(PromptKind::Interactive);

        assert!(prompt.contains("Command Blacklist:\n- rm -rf *\n- mkfs*"));
        assert!(!prompt.contains(BLACKLIST_PLACEHOLDER));
    }

    #[test]
    fn test_empty_blacklist_omits_section() {
        let prompts = Prompts::new(Language::English, &Blacklist::default());
        assert!(!prompts.get(PromptKind::ContinueAnalysis).contains("[Command Blacklist]"));
    }

    #[test]
    fn test_language_instruction() {
        let zh = Prompts::new(Language::Chinese, &Blacklist::default());
        assert!(zh.get(PromptKind::PipeAnalysis).contains("Simplified Chinese"));

        let en = Prompts::new(Language::English, &Blacklist::default());
        assert!(en.get(PromptKind::PipeAnalysis).contains("Respond in English"));
    }

    #[test]
    fn test_pipe_prompt_states_no_execution() {
        let prompts = Prompts::new(Language::English, &Blacklist::default());
        assert!(prompts.get(PromptKind::PipeAnalysis).contains("does not execute"));
    }
}
