//! Injection-style pattern screening for chat commands.
//!
//! Detects shell metacharacters, path traversal, SQL keywords, script tags
//! and null bytes. Two harmless syntaxes are removed from a working copy of
//! the text before any blacklist rule runs:
//!
//! - bracketed expression tags such as `[whisper]` or `[soft voice]`
//! - two-letter language tags such as `<en>`
//!
//! Stripping has to happen first; otherwise the bracket characters of a
//! legitimate tag would trip the metacharacter rule.

use regex::Regex;
use serde::Serialize;

/// A named blacklist rule.
struct BlacklistPattern {
    name: &'static str,
    pattern: Regex,
}

/// Result of screening one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub is_malicious: bool,
    /// Name of the first rule that matched.
    pub pattern: Option<&'static str>,
    /// The matched substring.
    pub matched: Option<String>,
}

impl Detection {
    fn clean() -> Self {
        Self {
            is_malicious: false,
            pattern: None,
            matched: None,
        }
    }
}

/// Compiled whitelist and blacklist, built once and reused.
pub struct PatternDetector {
    whitelist: Vec<Regex>,
    blacklist: Vec<BlacklistPattern>,
}

impl PatternDetector {
    pub fn new() -> Self {
        let whitelist = vec![
            Regex::new(r"\[[\w\s]+\]").expect("tag whitelist pattern should compile"),
            Regex::new(r"<[A-Za-z]{2}>").expect("language whitelist pattern should compile"),
        ];
        let blacklist = vec![
            BlacklistPattern {
                name: "shell_metacharacters",
                pattern: Regex::new(r"[;&|`$(){}\[\]<>]")
                    .expect("metacharacter pattern should compile"),
            },
            BlacklistPattern {
                name: "path_traversal",
                pattern: Regex::new(r"\.\./|\.\.\\").expect("traversal pattern should compile"),
            },
            BlacklistPattern {
                name: "sql_keyword",
                pattern: Regex::new(
                    r"(?i)\b(SELECT|INSERT|UPDATE|DELETE|DROP|CREATE|ALTER|EXEC|UNION)\b",
                )
                .expect("sql pattern should compile"),
            },
            BlacklistPattern {
                name: "script_tag",
                pattern: Regex::new(r"(?i)<\s*/?\s*script\b[^>]*>")
                    .expect("script pattern should compile"),
            },
            BlacklistPattern {
                name: "null_byte",
                pattern: Regex::new(r"\x00").expect("null byte pattern should compile"),
            },
        ];
        Self {
            whitelist,
            blacklist,
        }
    }

    /// Screen `text`. The first matching rule wins.
    pub fn detect(&self, text: &str) -> Detection {
        let mut cleaned = text.to_string();
        for allowed in &self.whitelist {
            cleaned = allowed.replace_all(&cleaned, " ").into_owned();
        }

        for rule in &self.blacklist {
            if let Some(m) = rule.pattern.find(&cleaned) {
                return Detection {
                    is_malicious: true,
                    pattern: Some(rule.name),
                    matched: Some(m.as_str().to_string()),
                };
            }
        }
        Detection::clean()
    }

    /// Names of the blacklist rules in evaluation order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.blacklist.iter().map(|r| r.name).collect()
    }
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelisted_tags_are_not_malicious() {
        let d = PatternDetector::new();
        let r = d.detect("[whisper] hello <en> world");
        assert!(!r.is_malicious, "{r:?}");
        assert!(!d.detect("[soft voice] good night <id>").is_malicious);
    }

    #[test]
    fn command_substitution_is_malicious() {
        let r = PatternDetector::new().detect("rm -rf $(echo x)");
        assert!(r.is_malicious);
        assert_eq!(r.pattern, Some("shell_metacharacters"));
        assert_eq!(r.matched.as_deref(), Some("$"));
    }

    #[test]
    fn each_rule_fires() {
        let d = PatternDetector::new();
        assert_eq!(d.detect("cat a; ls").pattern, Some("shell_metacharacters"));
        assert_eq!(d.detect("open ../../etc/passwd").pattern, Some("path_traversal"));
        assert_eq!(d.detect("open ..\\windows").pattern, Some("path_traversal"));
        assert_eq!(d.detect("1 union select 2").pattern, Some("sql_keyword"));
        assert_eq!(d.detect("x\0y").pattern, Some("null_byte"));
    }

    #[test]
    fn sql_keywords_need_word_boundaries() {
        let d = PatternDetector::new();
        assert!(!d.detect("selection of updates").is_malicious);
        assert!(d.detect("Drop table users").is_malicious);
    }

    #[test]
    fn first_rule_wins_for_script_tags() {
        // `<` is a metacharacter, so the earlier rule reports it.
        let r = PatternDetector::new().detect("<script>alert(1)</script>");
        assert_eq!(r.pattern, Some("shell_metacharacters"));
    }

    #[test]
    fn three_letter_angle_tag_not_whitelisted() {
        assert!(PatternDetector::new().detect("<eng> hi").is_malicious);
    }

    #[test]
    fn plain_text_is_clean() {
        let r = PatternDetector::new().detect("play despacito please");
        assert_eq!(r, Detection::clean());
    }

    #[test]
    fn rule_order_is_stable() {
        assert_eq!(
            PatternDetector::new().rule_names(),
            vec![
                "shell_metacharacters",
                "path_traversal",
                "sql_keyword",
                "script_tag",
                "null_byte"
            ]
        );
    }
}
