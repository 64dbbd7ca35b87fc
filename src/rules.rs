use regex::Regex;
use serde::Deserialize;
use std::fmt;

use crate::bot::event::{MentionTarget, Mentionee};

/// A keyword and the text sent back when it matches.
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordReply {
    pub keyword: String,
    pub reply: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpecialSender {
    pub user_id: String,
    pub reply: String,
}

/// Rule definitions as they appear in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub special_sender: Option<SpecialSender>,
    #[serde(default)]
    pub mention_all_warning: Option<String>,
    #[serde(default)]
    pub mention_self_warning: Option<String>,
    /// Send every triggered mention warning at once instead of the first.
    #[serde(default)]
    pub combine_mention_warnings: bool,
    #[serde(default = "default_mention_separator")]
    pub mention_separator: String,
    #[serde(default)]
    pub fuzzy_keywords: Vec<KeywordReply>,
    #[serde(default)]
    pub keywords: Vec<KeywordReply>,
}

fn default_mention_separator() -> String {
    "\n".to_string()
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            special_sender: None,
            mention_all_warning: None,
            mention_self_warning: None,
            combine_mention_warnings: false,
            mention_separator: default_mention_separator(),
            fuzzy_keywords: Vec::new(),
            keywords: Vec::new(),
        }
    }
}

/// A fuzzy keyword whose pattern failed to compile.
#[derive(Debug)]
pub struct KeywordError {
    pub keyword: String,
    pub source: regex::Error,
}

impl fmt::Display for KeywordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "keyword '{}': {}", self.keyword, self.source)
    }
}

impl std::error::Error for KeywordError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// What the rules look at.
#[derive(Debug, Clone, Copy)]
pub struct Inbound<'a> {
    pub sender_id: Option<&'a str>,
    pub text: &'a str,
    pub mentionees: &'a [Mentionee],
}

/// Compiled rule set. Built once from config and shared read-only.
#[derive(Debug, Clone)]
pub struct Rules {
    special_sender: Option<SpecialSender>,
    mention_all_warning: Option<String>,
    mention_self_warning: Option<String>,
    combine_mention_warnings: bool,
    mention_separator: String,
    fuzzy: Vec<(Regex, String)>,
    keywords: Vec<KeywordReply>,
}

/// Pattern matching `keyword`'s characters in order with anything between them.
///
/// "AB" becomes `(?s)A.*?B`, so "A!!B" and "A B" match while "BA" does not.
pub fn fuzzy_pattern(keyword: &str) -> Result<Regex, regex::Error> {
    let body = keyword
        .chars()
        .map(|c| regex::escape(c.encode_utf8(&mut [0; 4])))
        .collect::<Vec<_>>()
        .join(".*?");
    Regex::new(&format!("(?s){body}"))
}

impl Rules {
    pub fn compile(config: &RulesConfig) -> Result<Self, KeywordError> {
        let fuzzy = config
            .fuzzy_keywords
            .iter()
            .map(|k| match fuzzy_pattern(&k.keyword) {
                Ok(re) => Ok((re, k.reply.clone())),
                Err(source) => Err(KeywordError { keyword: k.keyword.clone(), source }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            special_sender: config.special_sender.clone(),
            mention_all_warning: config.mention_all_warning.clone(),
            mention_self_warning: config.mention_self_warning.clone(),
            combine_mention_warnings: config.combine_mention_warnings,
            mention_separator: config.mention_separator.clone(),
            fuzzy,
            keywords: config.keywords.clone(),
        })
    }

    /// Reply for this message, if any rule fires.
    ///
    /// Tiers in order: special sender, mention warnings, fuzzy keywords,
    /// literal keywords. The first tier that produces a reply wins.
    pub fn decide(&self, input: Inbound<'_>) -> Option<String> {
        if let (Some(special), Some(sender)) = (&self.special_sender, input.sender_id)
            && special.user_id == sender
        {
            return Some(special.reply.clone());
        }

        if let Some(warning) = self.mention_warning(input.mentionees) {
            return Some(warning);
        }

        if let Some((_, reply)) = self.fuzzy.iter().find(|(re, _)| re.is_match(input.text)) {
            return Some(reply.clone());
        }

        self.keywords
            .iter()
            .find(|k| input.text.contains(&k.keyword))
            .map(|k| k.reply.clone())
    }

    fn mention_warning(&self, mentionees: &[Mentionee]) -> Option<String> {
        let everyone = mentionees.iter().any(|m| m.target() == MentionTarget::Everyone);
        let bot = mentionees.iter().any(|m| m.target() == MentionTarget::Bot);

        let triggered: Vec<&str> = [
            (everyone, self.mention_all_warning.as_deref()),
            (bot, self.mention_self_warning.as_deref()),
        ]
        .into_iter()
        .filter_map(|(hit, warning)| if hit { warning } else { None })
        .collect();

        if triggered.is_empty() {
            None
        } else if self.combine_mention_warnings {
            Some(triggered.join(&self.mention_separator))
        } else {
            Some(triggered[0].to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.special_sender.is_none()
            && self.mention_all_warning.is_none()
            && self.mention_self_warning.is_none()
            && self.fuzzy.is_empty()
            && self.keywords.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::event::MentioneeKind;

    fn kw(keyword: &str, reply: &str) -> KeywordReply {
        KeywordReply {
            keyword: keyword.to_string(),
            reply: reply.to_string(),
        }
    }

    fn test_rules() -> Rules {
        Rules::compile(&RulesConfig {
            special_sender: Some(SpecialSender {
                user_id: "Uspecial".to_string(),
                reply: "hello boss".to_string(),
            }),
            mention_all_warning: Some("please don't ping everyone".to_string()),
            mention_self_warning: Some("don't tag me".to_string()),
            combine_mention_warnings: false,
            mention_separator: "\n".to_string(),
            fuzzy_keywords: vec![kw("AB", "fuzzy hit")],
            keywords: vec![kw("lunch", "go eat")],
        })
        .unwrap()
    }

    fn mentionee(kind: MentioneeKind, is_self: bool) -> Mentionee {
        Mentionee {
            kind,
            user_id: None,
            is_self,
        }
    }

    fn input<'a>(sender: &'a str, text: &'a str, mentionees: &'a [Mentionee]) -> Inbound<'a> {
        Inbound {
            sender_id: Some(sender),
            text,
            mentionees,
        }
    }

    #[test]
    fn test_fuzzy_pattern() {
        let re = fuzzy_pattern("AB").unwrap();
        assert!(re.is_match("A!!B"));
        assert!(re.is_match("xxA\nByy"));
        assert!(!re.is_match("BA"));
        assert!(!re.is_match("A"));
    }

    #[test]
    fn test_fuzzy_pattern_escapes_metacharacters() {
        let re = fuzzy_pattern("a.b").unwrap();
        assert!(re.is_match("a - . - b"));
        assert!(!re.is_match("axb"));
    }

    #[test]
    fn test_fuzzy_pattern_multibyte() {
        let re = fuzzy_pattern("早安").unwrap();
        assert!(re.is_match("早～～安"));
        assert!(!re.is_match("安早"));
    }

    #[test]
    fn test_special_sender_wins_over_fuzzy() {
        let rules = test_rules();
        assert_eq!(
            rules.decide(input("Uspecial", "A then B and lunch", &[])),
            Some("hello boss".to_string())
        );
    }

    #[test]
    fn test_mention_everyone() {
        let rules = test_rules();
        let m = [mentionee(MentioneeKind::All, false)];
        assert_eq!(
            rules.decide(input("U1", "@All AB", &m)),
            Some("please don't ping everyone".to_string())
        );
    }

    #[test]
    fn test_mention_self() {
        let rules = test_rules();
        let m = [mentionee(MentioneeKind::User, true)];
        assert_eq!(rules.decide(input("U1", "@bot", &m)), Some("don't tag me".to_string()));
    }

    #[test]
    fn test_mention_other_user_falls_through() {
        let rules = test_rules();
        let m = [mentionee(MentioneeKind::User, false)];
        assert_eq!(rules.decide(input("U1", "@bob", &m)), None);
    }

    #[test]
    fn test_combined_mention_warnings() {
        let mut config = RulesConfig {
            mention_all_warning: Some("no @all".to_string()),
            mention_self_warning: Some("no @me".to_string()),
            combine_mention_warnings: true,
            mention_separator: " | ".to_string(),
            ..Default::default()
        };
        let m = [mentionee(MentioneeKind::All, false), mentionee(MentioneeKind::User, true)];

        let rules = Rules::compile(&config).unwrap();
        assert_eq!(rules.decide(input("U1", "", &m)), Some("no @all | no @me".to_string()));

        config.combine_mention_warnings = false;
        let rules = Rules::compile(&config).unwrap();
        assert_eq!(rules.decide(input("U1", "", &m)), Some("no @all".to_string()));
    }

    #[test]
    fn test_default_separator_matches_config_file() {
        let from_file: RulesConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(RulesConfig::default().mention_separator, from_file.mention_separator);

        let rules = Rules::compile(&RulesConfig {
            mention_all_warning: Some("no @all".to_string()),
            mention_self_warning: Some("no @me".to_string()),
            combine_mention_warnings: true,
            ..Default::default()
        })
        .unwrap();
        let m = [mentionee(MentioneeKind::All, false), mentionee(MentioneeKind::User, true)];
        assert_eq!(rules.decide(input("U1", "", &m)), Some("no @all\nno @me".to_string()));
    }

    #[test]
    fn test_fuzzy_before_literal() {
        let rules = Rules::compile(&RulesConfig {
            fuzzy_keywords: vec![kw("lnch", "fuzzy")],
            keywords: vec![kw("lunch", "literal")],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(rules.decide(input("U1", "lunch?", &[])), Some("fuzzy".to_string()));
    }

    #[test]
    fn test_literal_keyword() {
        let rules = test_rules();
        assert_eq!(rules.decide(input("U1", "time for lunch", &[])), Some("go eat".to_string()));
        assert_eq!(rules.decide(input("U1", "l u n c h", &[])), None);
    }

    #[test]
    fn test_no_match() {
        let rules = test_rules();
        assert_eq!(rules.decide(input("U1", "nothing here", &[])), None);
    }

    #[test]
    fn test_missing_sender_skips_special_case() {
        let rules = test_rules();
        let no_sender = Inbound {
            sender_id: None,
            text: "hi",
            mentionees: &[],
        };
        assert_eq!(rules.decide(no_sender), None);
    }

    #[test]
    fn test_empty_rules() {
        assert!(Rules::compile(&RulesConfig::default()).unwrap().is_empty());
        assert!(!test_rules().is_empty());
    }
}
