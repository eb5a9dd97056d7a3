use anyhow::{Context, Result};
use regex::Regex;

/// Commands the operator never wants run, whatever the model or the user says.
///
/// Patterns use shell-style wildcards (`*` any run of characters, `?` one character) and are
/// matched against the whole command. A pattern without wildcards matches when its words are a
/// prefix of the command's words, so `shutdown` also blocks `shutdown -h now`. The first word of
/// both sides is reduced to its base name and a leading `sudo` is ignored.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    rules: Vec<Rule>,
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Glob(Regex),
    Words(Vec<String>),
}

impl Blacklist {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut rules = Vec::new();
        for pattern in patterns {
            let words = normalize_words(pattern);
            if words.is_empty() {
                continue;
            }

            let matcher = if pattern.contains(['*', '?']) {
                let regex = glob_to_regex(&words.join(" "))
                    .with_context(|| format!("invalid blacklist pattern '{}'", pattern))?;
                Matcher::Glob(regex)
            } else {
                Matcher::Words(words)
            };

            rules.push(Rule {
                pattern: pattern.clone(),
                matcher,
            });
        }
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.pattern.as_str())
    }

    /// The first rule the command matches, if any
    pub fn matching_rule(&self, command: &str) -> Option<&str> {
        let words = normalize_words(command);
        if words.is_empty() {
            return None;
        }

        let without_sudo = match words.first().map(String::as_str) {
            Some("sudo") if words.len() > 1 => Some(normalize_words(&words[1..].join(" "))),
            _ => None,
        };

        self.rules
            .iter()
            .find(|rule| {
                rule.matches(&words) || without_sudo.as_ref().is_some_and(|w| rule.matches(w))
            })
            .map(|rule| rule.pattern.as_str())
    }

    pub fn is_blacklisted(&self, command: &str) -> bool {
        self.matching_rule(command).is_some()
    }

    /// Section substituted into the system prompts; empty when there are no rules
    pub fn format_for_prompt(&self) -> String {
        if self.rules.is_empty() {
            return String::new();
        }

        let items: Vec<&str> = self.patterns().collect();
        format!("Command Blacklist:\n- {}", items.join("\n- "))
    }
}

impl Rule {
    fn matches(&self, words: &[String]) -> bool {
        match &self.matcher {
            Matcher::Glob(regex) => regex.is_match(&words.join(" ")),
            Matcher::Words(pattern) => words.len() >= pattern.len() && words[..pattern.len()] == pattern[..],
        }
    }
}

/// Split on whitespace and strip any directory from the first word
fn normalize_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            if i == 0 {
                word.rsplit('/').next().unwrap_or(word).to_string()
            } else {
                word.to_string()
            }
        })
        .collect()
}

fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Ok(Regex::new(&pattern)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blacklist(patterns: &[&str]) -> Blacklist {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        Blacklist::new(&patterns).unwrap()
    }

    #[test]
    fn test_wildcard_requires_arguments() {
        let list = blacklist(&["rm *"]);
        assert_eq!(list.matching_rule("rm -rf /"), Some("rm *"));
        assert_eq!(list.matching_rule("rm file.txt"), Some("rm *"));
        assert_eq!(list.matching_rule("rm"), None);
    }

    #[test]
    fn test_multi_word_wildcard() {
        let list = blacklist(&["kubectl delete *"]);
        assert!(list.is_blacklisted("kubectl delete pod nginx"));
        assert!(!list.is_blacklisted("kubectl get pods"));
        assert!(!list.is_blacklisted("kubectl"));
    }

    #[test]
    fn test_plain_pattern_matches_word_prefix() {
        let list = blacklist(&["shutdown", "rm -rf"]);
        assert_eq!(list.matching_rule("shutdown"), Some("shutdown"));
        assert_eq!(list.matching_rule("shutdown -h now"), Some("shutdown"));
        assert_eq!(list.matching_rule("rm -rf /tmp/foo"), Some("rm -rf"));
        assert_eq!(list.matching_rule("rm -r /tmp"), None);
    }

    #[test]
    fn test_suffix_wildcard_on_first_word() {
        let list = blacklist(&["mkfs*"]);
        assert!(list.is_blacklisted("mkfs.ext4 /dev/sdb1"));
        assert!(list.is_blacklisted("mkfs"));
        assert!(!list.is_blacklisted("ls mkfs"));
    }

    #[test]
    fn test_question_mark_matches_one_character() {
        let list = blacklist(&["init ?"]);
        assert!(list.is_blacklisted("init 0"));
        assert!(!list.is_blacklisted("init 10"));
    }

    #[test]
    fn test_base_name_normalization() {
        assert!(blacklist(&["rm *"]).is_blacklisted("/usr/bin/rm -rf /"));
        assert!(blacklist(&["/usr/bin/rm *"]).is_blacklisted("rm -rf /"));
    }

    #[test]
    fn test_leading_sudo_is_ignored() {
        let list = blacklist(&["dd *"]);
        assert!(list.is_blacklisted("sudo dd if=/dev/zero of=/dev/sda"));
        assert!(!list.is_blacklisted("sudo ls"));
    }

    #[test]
    fn test_no_match_cases() {
        let list = blacklist(&["rm *"]);
        assert!(!list.is_blacklisted("ls -la"));
        assert!(!list.is_blacklisted("remove-dir foo"));
        assert!(!list.is_blacklisted(""));
        assert!(!blacklist(&[]).is_blacklisted("rm -rf /"));
    }

    #[test]
    fn test_regex_characters_are_literal() {
        let list = blacklist(&["echo a.b*"]);
        assert!(list.is_blacklisted("echo a.bc"));
        assert!(!list.is_blacklisted("echo axbc"));
    }

    #[test]
    fn test_format_for_prompt() {
        assert_eq!(blacklist(&[]).format_for_prompt(), "");
        assert_eq!(blacklist(&["rm *"]).format_for_prompt(), "Command Blacklist:\n- rm *");
        assert_eq!(
            blacklist(&["rm *", "dd *", "kubectl delete *"]).format_for_prompt(),
            "Command Blacklist:\n- rm *\n- dd *\n- kubectl delete *"
        );
    }

    #[test]
    fn test_blank_patterns_are_ignored() {
        let list = blacklist(&["", "   "]);
        assert!(list.is_empty());
    }
}
