use serde::{Deserialize, Serialize};
use std::fmt;

/// UI language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "zh")]
    Chinese,
}

impl Language {
    /// Parse a language code, falling back to English for anything unknown
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "zh" | "zh-cn" | "zh_cn" | "cn" => Language::Chinese,
            _ => Language::English,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Chinese => "zh",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Localized string lookup
#[derive(Debug, Clone)]
pub struct I18n {
    language: Language,
}

impl I18n {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Translate a key. Unknown keys come back unchanged so a missing entry is visible, not fatal.
    pub fn t(&self, key: &str) -> String {
        let message = match self.language {
            Language::Chinese => chinese(key).or_else(|| english(key)),
            Language::English => english(key),
        };
        message.unwrap_or(key).to_string()
    }

    /// Translate a key and fill its `{}` placeholders in order
    pub fn tf(&self, key: &str, args: &[&dyn fmt::Display]) -> String {
        fill_placeholders(&self.t(key), args)
    }
}

impl Default for I18n {
    fn default() -> Self {
        Self::new(Language::English)
    }
}

fn fill_placeholders(template: &str, args: &[&dyn fmt::Display]) -> String {
    let mut result = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;

    while let Some(pos) = rest.find("{}") {
        result.push_str(&rest[..pos]);
        match args.next() {
            Some(arg) => result.push_str(&arg.to_string()),
            None => result.push_str("{}"),
        }
        rest = &rest[pos + 2..];
    }
    result.push_str(rest);
    result
}

fn english(key: &str) -> Option<&'static str> {
    let message = match key {
        "config.not_found" => "✗ Configuration file not found",
        "config.created" => "A default configuration was written to {}",
        "config.hint_edit" => "Please edit the config file and add your providers: {}",

        "interactive.welcome" => "Welcome to AI Shell Assistant",
        "interactive.help_hint" => "Type 'help' for commands, 'exit' or Ctrl+C to quit",
        "interactive.input_prompt" => "Please enter your question: ",
        "interactive.goodbye" => "Goodbye!",
        "interactive.thinking" => "Thinking",
        "interactive.continue_analysis" => "Based on the complete conversation history and the executed command output above, please continue with the next steps of analysis and diagnosis, listing the remaining steps and commands.",
        "interactive.executed_command" => "Executed Command",
        "interactive.execution_output" => "Execution Output",
        "interactive.execution_error" => "Execution Error",
        "interactive.user_label" => "User",
        "interactive.ai_label" => "AI",
        "interactive.analysis_complete" => "✓ Analysis complete, please continue with questions",
        "interactive.pipe_user_question" => "User question: ",
        "interactive.pipe_data" => "Pipe output data:",
        "interactive.pipe_default_question" => "Please analyze the following output.",
        "interactive.history_empty" => "No conversation history yet",
        "interactive.history_title" => "Conversation history",
        "interactive.cleared" => "Conversation history cleared",
        "interactive.interrupted" => "Interrupted, exiting.",
        "interactive.help_title" => "Available commands:",
        "interactive.help_history" => "  history  - show the conversation so far",
        "interactive.help_status" => "  status   - show model availability",
        "interactive.help_clear" => "  clear    - forget the conversation (system facts are kept)",
        "interactive.help_exit" => "  exit     - quit (Ctrl+C also works)",
        "interactive.help_examples" => "Examples:",
        "interactive.help_ex1" => "  Why is the load average so high on this server?",
        "interactive.help_ex2" => "  Which process is listening on port 8080?",
        "interactive.help_ex3" => "  The disk is almost full, find what is using the space",

        "executor.query_command" => "Query command:",
        "executor.modify_command" => "Modify command (requires confirmation):",
        "executor.execute_prompt" => "Execute this command? (y/n): ",
        "executor.modify_warning" => "Warning: This command will modify the server, are you sure? (y/n): ",
        "executor.executing" => "Executing",
        "executor.execute_success" => "✓ Execution successful",
        "executor.execute_failed" => "✗ Execution failed: {}",
        "executor.no_output" => "(no output)",
        "executor.max_depth_reached" => "Warning: Maximum command analysis depth reached. Stopping to prevent infinite recursion.",
        "executor.skipped" => "Skipped",
        "executor.blacklisted" => "✗ Command rejected: This command matches blacklist rule '{}', execution forbidden",
        "executor.blacklist_hint" => "To execute this command, please contact the administrator for permission or modify the blacklist configuration",
        "executor.proposed" => "Proposed commands (pipe mode does not execute them):",

        "output.truncated" => "omitted {} lines of output",

        "error.no_models" => "✗ Error: No models configured",
        "error.hint_no_models" => "Please add at least one enabled provider and model to {}",
        "error.general" => "✗ Error: {}",

        "llm.status_title" => "Models (tried in this order)",
        "llm.status_default" => "(Default)",
        "llm.available" => "available",
        "llm.unavailable" => "unavailable (rate limited)",
        "llm.disabled" => "disabled",
        "llm.fallback_warning" => "[warning] {} failed, trying next model: {}",
        _ => return None,
    };
    Some(message)
}

fn chinese(key: &str) -> Option<&'static str> {
    let message = match key {
        "config.not_found" => "✗ 未找到配置文件",
        "config.created" => "已生成默认配置文件: {}",
        "config.hint_edit" => "请编辑配置文件并添加模型提供商: {}",

        "interactive.welcome" => "欢迎使用 AI Shell 助手",
        "interactive.help_hint" => "输入 'help' 查看命令, 输入 'exit' 或按 Ctrl+C 退出",
        "interactive.input_prompt" => "请输入你的问题: ",
        "interactive.goodbye" => "再见!",
        "interactive.thinking" => "思考中",
        "interactive.continue_analysis" => "根据以上完整的对话历史和已执行的命令输出，请继续进行接下来的分析和诊断，列出剩余的步骤和命令。",
        "interactive.executed_command" => "执行命令",
        "interactive.execution_output" => "执行输出",
        "interactive.execution_error" => "执行错误",
        "interactive.user_label" => "用户",
        "interactive.ai_label" => "AI",
        "interactive.analysis_complete" => "✓ 分析完成，请继续提问",
        "interactive.pipe_user_question" => "用户问题: ",
        "interactive.pipe_data" => "管道输出数据:",
        "interactive.pipe_default_question" => "请分析以下输出。",
        "interactive.history_empty" => "暂无对话历史",
        "interactive.history_title" => "对话历史",
        "interactive.cleared" => "对话历史已清空",
        "interactive.interrupted" => "已中断，正在退出。",
        "interactive.help_title" => "可用命令:",
        "interactive.help_history" => "  history  - 查看对话历史",
        "interactive.help_status" => "  status   - 查看模型状态",
        "interactive.help_clear" => "  clear    - 清空对话 (保留系统信息)",
        "interactive.help_exit" => "  exit     - 退出 (也可按 Ctrl+C)",
        "interactive.help_examples" => "示例:",
        "interactive.help_ex1" => "  为什么这台服务器负载这么高?",
        "interactive.help_ex2" => "  哪个进程在监听 8080 端口?",
        "interactive.help_ex3" => "  磁盘快满了，找出占用空间的目录",

        "executor.query_command" => "查询命令:",
        "executor.modify_command" => "修改命令 (需要确认):",
        "executor.execute_prompt" => "是否执行该命令? (y/n): ",
        "executor.modify_warning" => "警告: 该命令将修改服务器，确定执行吗? (y/n): ",
        "executor.executing" => "执行中",
        "executor.execute_success" => "✓ 执行成功",
        "executor.execute_failed" => "✗ 执行失败: {}",
        "executor.no_output" => "(没有输出)",
        "executor.max_depth_reached" => "警告: 已达到最大命令分析深度。停止以防止无限递归。",
        "executor.skipped" => "已跳过",
        "executor.blacklisted" => "✗ 命令被拒绝: 该命令匹配黑名单规则 '{}'，禁止执行",
        "executor.blacklist_hint" => "如需执行该命令，请联系管理员获取权限或修改黑名单配置",
        "executor.proposed" => "建议的命令 (管道模式不会执行):",

        "output.truncated" => "省略 {} 行输出",

        "error.no_models" => "✗ 错误: 未配置任何模型",
        "error.hint_no_models" => "请先在配置文件中添加至少一个启用的模型: {}",
        "error.general" => "✗ 错误: {}",

        "llm.status_title" => "模型 (按此顺序尝试)",
        "llm.status_default" => "(默认)",
        "llm.available" => "可用",
        "llm.unavailable" => "不可用 (被限流)",
        "llm.disabled" => "已禁用",
        "llm.fallback_warning" => "[警告] {} 调用失败，尝试下一个模型: {}",
        _ => return None,
    };
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_code() {
        assert_eq!(Language::from_code("zh"), Language::Chinese);
        assert_eq!(Language::from_code("ZH"), Language::Chinese);
        assert_eq!(Language::from_code("en"), Language::English);
        assert_eq!(Language::from_code("fr"), Language::English);
    }

    #[test]
    fn test_translate_english() {
        let i18n = I18n::new(Language::English);
        assert_eq!(i18n.t("interactive.goodbye"), "Goodbye!");
    }

    #[test]
    fn test_translate_chinese() {
        let i18n = I18n::new(Language::Chinese);
        assert_eq!(i18n.t("interactive.goodbye"), "再见!");
    }

    #[test]
    fn test_unknown_key_is_returned() {
        let i18n = I18n::default();
        assert_eq!(i18n.t("no.such.key"), "no.such.key");
    }

    #[test]
    fn test_placeholders() {
        let i18n = I18n::default();
        assert_eq!(i18n.tf("output.truncated", &[&42]), "omitted 42 lines of output");
        assert_eq!(
            i18n.tf("llm.fallback_warning", &[&"a/b", &"boom"]),
            "[warning] a/b failed, trying next model: boom"
        );
    }

    #[test]
    fn test_missing_args_keep_placeholder() {
        assert_eq!(fill_placeholders("x {} y {}", &[&1]), "x 1 y {}");
    }

    #[test]
    fn test_every_english_key_has_chinese_entry() {
        for key in [
            "interactive.welcome",
            "executor.no_output",
            "executor.max_depth_reached",
            "output.truncated",
            "llm.status_title",
        ] {
            assert!(chinese(key).is_some(), "missing zh entry for {}", key);
        }
    }
}
