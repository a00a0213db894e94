use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{decode_utf8, UnitAnalyzer};
use crate::error::Result;
use crate::ir::{Capability, Indicator, SourceLocation, UnitKind};

pub struct ShellAnalyzer;

static NETWORK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)\b(curl|wget|nc|ncat|ssh|scp|rsync|ftp)\s+").unwrap());

static EVAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(?:^|[;&|]\s*)(eval|source|\.)\s+").unwrap());

static INSTALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)\b(pip3?\s+install|npm\s+install|npm\s+i\b|yarn\s+add|pnpm\s+add)").unwrap()
});

static SUBSHELL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]+`|\$\(").unwrap());

static ENV_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)|\bexport\s+\w+").unwrap());

static FS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(?:^|[;&|]\s*)(rm|cp|mv|mkdir|rmdir|touch|chmod|chown|ln|tee|cat)\s+|>>?\s*[\w/.$~]")
        .unwrap()
});

/// Commands the shell runs itself. Anything else in command position starts
/// a program.
const SHELL_BUILTINS: &[&str] = &[
    ":", ".", "[", "[[", "alias", "bg", "break", "builtin", "cd", "continue", "declare",
    "echo", "eval", "exit", "export", "false", "fg", "getopts", "hash", "jobs", "let",
    "local", "printf", "pwd", "read", "readonly", "return", "set", "shift", "shopt",
    "source", "test", "trap", "true", "type", "typeset", "ulimit", "umask", "unalias",
    "unset", "wait",
];

/// Keywords that may precede a command in the same segment.
const LEADING_KEYWORDS: &[&str] = &[
    "if", "then", "else", "elif", "while", "until", "do", "time", "!", "{", "(",
];

/// Keywords after which the segment holds no command.
const CLOSING_KEYWORDS: &[&str] = &[
    "fi", "done", "esac", "for", "case", "select", "function", "in", "}", ")", ";;",
];

/// Separators inside quotes do not split commands.
fn neutralize_quoted(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    for ch in line.chars() {
        match quote {
            Some(q) if ch == q => {
                quote = None;
                out.push(ch);
            }
            Some(_) if matches!(ch, ';' | '&' | '|') => out.push(' '),
            Some(_) => out.push(ch),
            None => {
                if ch == '\'' || ch == '"' {
                    quote = Some(ch);
                }
                out.push(ch);
            }
        }
    }
    out
}

fn is_assignment(word: &str) -> bool {
    word.split_once('=').is_some_and(|(name, _)| {
        !name.is_empty()
            && !name.starts_with(|c: char| c.is_ascii_digit())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// The program a command segment starts, if it starts one.
fn external_command(segment: &str) -> Option<&str> {
    for word in segment.split_whitespace() {
        let word = word.trim_start_matches(['(', '{']);
        if word.is_empty() || LEADING_KEYWORDS.contains(&word) || is_assignment(word) {
            continue;
        }
        if CLOSING_KEYWORDS.contains(&word)
            || word.starts_with(|c: char| c.is_ascii_digit() || c == '<' || c == '>')
            || word.contains('(')
            || word.ends_with(')')
        {
            return None;
        }
        let name = word.rsplit('/').next().unwrap_or(word);
        if SHELL_BUILTINS.contains(&name) {
            return None;
        }
        return Some(word);
    }
    None
}

/// Positional and special parameters are not environment reads.
fn is_shell_special(var: &str) -> bool {
    var.chars().all(|c| c.is_ascii_digit()) || matches!(var, "_" | "@" | "*" | "#" | "?")
}

impl UnitAnalyzer for ShellAnalyzer {
    fn kind(&self) -> UnitKind {
        UnitKind::Shell
    }

    fn analyze(&self, path: &Path, content: &[u8]) -> Result<Vec<Indicator>> {
        let source = decode_utf8(path, content)?;
        let mut indicators = Vec::new();
        let mut push = |capability: Capability, construct: &str, line: usize| {
            indicators.push(Indicator {
                capability,
                construct: construct.to_string(),
                location: SourceLocation::new(path, line, 0),
            });
        };

        for (line_idx, line) in source.lines().enumerate() {
            let line_num = line_idx + 1;
            let trimmed = line.trim();

            if trimmed.starts_with('#') || trimmed.is_empty() {
                continue;
            }

            if let Some(cap) = NETWORK_RE.captures(trimmed) {
                push(Capability::Network, &cap[1], line_num);
            }

            if let Some(cap) = EVAL_RE.captures(trimmed) {
                push(Capability::DynamicCodeExecution, &cap[1], line_num);
            }

            if SUBSHELL_RE.is_match(trimmed) {
                push(Capability::Subprocess, "command substitution", line_num);
            }

            let unquoted = neutralize_quoted(trimmed);
            for segment in unquoted.split([';', '&', '|']) {
                if let Some(command) = external_command(segment) {
                    push(Capability::Subprocess, command, line_num);
                }
            }

            if let Some(m) = INSTALL_RE.find(trimmed) {
                push(Capability::Subprocess, m.as_str(), line_num);
                push(Capability::Network, m.as_str(), line_num);
            }

            let env_read = ENV_RE.captures_iter(trimmed).find(|cap| {
                cap.get(1)
                    .map_or(true, |var| !is_shell_special(var.as_str()))
            });
            if let Some(cap) = env_read {
                push(Capability::Environment, cap.get(0).map_or("", |m| m.as_str()), line_num);
            }

            if let Some(m) = FS_RE.find(trimmed) {
                push(Capability::Filesystem, m.as_str().trim(), line_num);
            }
        }

        Ok(indicators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(code: &str) -> Vec<Capability> {
        let mut caps: Vec<Capability> = ShellAnalyzer
            .analyze(Path::new("bin/run.sh"), code.as_bytes())
            .unwrap()
            .into_iter()
            .map(|i| i.capability)
            .collect();
        caps.sort();
        caps.dedup();
        caps
    }

    #[test]
    fn detects_curl() {
        assert_eq!(
            caps("curl https://example.com/data\n"),
            vec![Capability::Network, Capability::Subprocess]
        );
    }

    #[test]
    fn any_external_program_is_a_subprocess() {
        for line in [
            "python -c 'import socket'\n",
            "bash ./other.sh\n",
            "/usr/bin/env python tool.py\n",
            "ls /tmp\n",
            "FOO=bar make install\n",
            "if true; then ./configure; fi\n",
        ] {
            assert!(caps(line).contains(&Capability::Subprocess), "{line}");
        }
    }

    #[test]
    fn env_invocation_names_env() {
        let indicators = ShellAnalyzer
            .analyze(Path::new("bin/run.sh"), b"/usr/bin/env python tool.py\n")
            .unwrap();
        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].construct, "/usr/bin/env");
    }

    #[test]
    fn builtins_and_keywords_are_not_programs() {
        assert!(!caps("cd /tmp && echo \"a; b | c\"\n").contains(&Capability::Subprocess));
        assert!(!caps("for f in a b; do echo $f; done\n").contains(&Capability::Subprocess));
        assert!(!caps("x=1\n").contains(&Capability::Subprocess));
    }

    #[test]
    fn detects_eval() {
        assert!(caps("eval \"$1\"\n").contains(&Capability::DynamicCodeExecution));
    }

    #[test]
    fn detects_pip_install() {
        assert_eq!(
            caps("pip install requests\n"),
            vec![Capability::Network, Capability::Subprocess]
        );
    }

    #[test]
    fn detects_env_and_redirect() {
        assert_eq!(
            caps("echo \"$HOME\" > out.txt\n"),
            vec![Capability::Filesystem, Capability::Environment]
        );
    }

    #[test]
    fn positional_parameters_are_not_env() {
        assert!(caps("echo \"$1\" \"$@\"\n").is_empty());
    }

    #[test]
    fn comments_are_skipped() {
        assert!(caps("# curl https://example.com\n").is_empty());
    }
}
