//! Hardcoded credential detection
//!
//! A literal is only reported when both halves agree: the value looks like
//! an opaque token and the name it is bound to looks like a credential.

use super::{Rule, RuleScope, UnitContext};
use crate::config::{ConfigError, RuleSetConfig};
use crate::metrics::names::is_secret_name;
use crate::models::{Finding, Location, RuleCategory, Severity};
use crate::symbols::{LiteralValue, StructuralCategory};
use regex::Regex;
use std::sync::OnceLock;

const SECRET_LITERAL: &str = "secret-literal";

/// Values that are obviously not real credentials
const PLACEHOLDERS: &[&str] = &["example", "placeholder", "xxxx", "changeme", "dummy", "your_"];

static OPAQUE_TOKEN: OnceLock<Regex> = OnceLock::new();

fn opaque_token() -> &'static Regex {
    OPAQUE_TOKEN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9+/=_\-.:~]+$").expect("static secret pattern is valid")
    })
}

/// Opaque: no whitespace, token charset, not a URL, and mixing at least two
/// of lowercase/uppercase/digits.
fn is_opaque(value: &str, min_length: usize) -> bool {
    if value.chars().count() < min_length || value.contains("://") {
        return false;
    }
    if !opaque_token().is_match(value) {
        return false;
    }
    let lower = value.to_lowercase();
    if PLACEHOLDERS.iter().any(|p| lower.contains(p)) {
        return false;
    }

    let classes = [
        value.chars().any(|c| c.is_ascii_lowercase()),
        value.chars().any(|c| c.is_ascii_uppercase()),
        value.chars().any(|c| c.is_ascii_digit()),
    ];
    classes.iter().filter(|present| **present).count() >= 2
}

/// Flags credential-shaped literals bound to credential-like names
#[derive(Debug, Clone)]
pub struct SecretLiteralRule {
    min_length: usize,
}

impl Default for SecretLiteralRule {
    fn default() -> Self {
        Self { min_length: 32 }
    }
}

impl SecretLiteralRule {
    pub fn with_config(config: &RuleSetConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            min_length: config.threshold(SECRET_LITERAL, "min_length", 32)?,
        })
    }
}

impl Rule for SecretLiteralRule {
    fn id(&self) -> &'static str {
        SECRET_LITERAL
    }

    fn description(&self) -> &'static str {
        "Hardcoded credential literal"
    }

    fn rationale(&self) -> &'static str {
        "Secrets in source end up in every clone and log; load them from the environment or a secret manager."
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Security
    }

    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Unit
    }

    fn thresholds(&self) -> Vec<(&'static str, usize)> {
        vec![("min_length", self.min_length)]
    }

    fn check_unit(&self, ctx: &UnitContext<'_>) -> Vec<Finding> {
        let unit = ctx.unit;
        let mut findings = Vec::new();

        for (callable, literal) in unit.all_literals() {
            if callable.is_some_and(|c| c.category == StructuralCategory::Test) {
                continue;
            }
            let (Some(binding), LiteralValue::Str(value)) = (&literal.binding, &literal.value)
            else {
                continue;
            };
            if !is_secret_name(binding) || !is_opaque(value, self.min_length) {
                continue;
            }

            let location = match callable {
                Some(c) => Location::callable(&unit.path, &c.name, literal.line),
                None => Location::unit(&unit.path).at_line(literal.line),
            };
            findings.push(
                self.finding(
                    Severity::Error,
                    location,
                    format!("'{}' is assigned a hardcoded credential", binding),
                )
                .with_evidence("binding", binding.as_str())
                .with_evidence("length", value.chars().count()),
            );
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing::check;
    use crate::symbols::{LiteralToken, SourceUnit};

    const TOKEN: &str = "sk9f83KdmQ02bnZx71LpaT4vWc6yHe5R";

    fn unit_with(binding: &str, value: &str) -> SourceUnit {
        let mut unit = SourceUnit::new("settings.py", "python");
        unit.literals.push(LiteralToken::new(
            3,
            Some(binding),
            LiteralValue::Str(value.to_string()),
        ));
        unit
    }

    #[test]
    fn test_api_key_literal() {
        assert_eq!(TOKEN.len(), 32);
        let findings = check(&SecretLiteralRule::default(), &unit_with("api_key", TOKEN));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Error);
        assert_eq!(findings[0].location.line, Some(3));
    }

    #[test]
    fn test_non_secret_name_is_ignored() {
        assert!(check(&SecretLiteralRule::default(), &unit_with("message", TOKEN)).is_empty());
    }

    #[test]
    fn test_non_opaque_values_are_ignored() {
        let rule = SecretLiteralRule::default();
        assert!(check(&rule, &unit_with("api_key", &TOKEN[..31])).is_empty());
        assert!(check(&rule, &unit_with("password", "this is a long sentence that is not a key")).is_empty());
        assert!(check(&rule, &unit_with("token_url", "https://auth.example.com/oauth2/token/v1")).is_empty());
        assert!(check(&rule, &unit_with("secret", "your_secret_key_goes_here_please_1234")).is_empty());
        assert!(check(&rule, &unit_with("api_key", "abcdefghijklmnopqrstuvwxyzabcdefgh")).is_empty());
    }

    #[test]
    fn test_min_length_configurable() {
        let config: RuleSetConfig =
            toml::from_str("[rules.secret-literal]\nthresholds = { min_length = 20 }\n")
                .expect("valid toml");
        let rule = SecretLiteralRule::with_config(&config).expect("valid config");
        assert_eq!(check(&rule, &unit_with("auth_token", &TOKEN[..24])).len(), 1);
    }
}
