//! Identifier vocabulary helpers
//!
//! Names are compared by segment: `apiKey`, `api_key` and `API-KEY` all
//! split into `["api", "key"]`, so `monkey` never matches `key`.

/// Segments that mark a name as holding a credential
const SECRET_SEGMENTS: &[&str] = &[
    "token", "tokens", "secret", "secrets", "password", "passwd", "pwd", "key", "apikey",
    "credential", "credentials", "passphrase",
];

/// Segments that must never reach a log line
const SENSITIVE_SEGMENTS: &[&str] = &[
    "token", "tokens", "secret", "secrets", "password", "passwd", "pwd", "apikey", "credential",
    "credentials", "passphrase", "ssn", "email", "phone", "dob", "cvv", "iban",
];

/// Adjacent segment pairs that are sensitive only together
const SENSITIVE_PAIRS: &[(&str, &str)] = &[
    ("api", "key"),
    ("private", "key"),
    ("secret", "key"),
    ("access", "key"),
    ("card", "number"),
    ("credit", "card"),
    ("social", "security"),
    ("date", "birth"),
];

/// Split an identifier into lowercase segments on `_`, `-`, `.`, spaces and
/// camelCase boundaries.
pub fn name_segments(name: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = name.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == '.' || c.is_whitespace() {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev_lower = i > 0 && chars[i - 1].is_lowercase();
            let acronym_end = i > 0
                && chars[i - 1].is_uppercase()
                && i + 1 < chars.len()
                && chars[i + 1].is_lowercase();
            if prev_lower || acronym_end {
                segments.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn has_pair(segments: &[String]) -> bool {
    segments.windows(2).any(|w| {
        SENSITIVE_PAIRS
            .iter()
            .any(|(a, b)| w[0] == *a && w[1] == *b)
    })
}

/// Name looks like it holds a credential (`api_key`, `authToken`, `DB_PASSWORD`)
pub fn is_secret_name(name: &str) -> bool {
    let segments = name_segments(name);
    segments.iter().any(|s| SECRET_SEGMENTS.contains(&s.as_str())) || has_pair(&segments)
}

/// Name refers to a credential or personal data (`password`, `user_email`)
pub fn is_sensitive_name(name: &str) -> bool {
    let segments = name_segments(name);
    segments
        .iter()
        .any(|s| SENSITIVE_SEGMENTS.contains(&s.as_str()))
        || has_pair(&segments)
}

/// Name carries an idempotency key (`idempotency_key`, `Idempotency-Key`)
pub fn is_idempotency_key_name(name: &str) -> bool {
    let segments = name_segments(name);
    segments
        .windows(2)
        .any(|w| w[0] == "idempotency" && w[1] == "key")
        || segments.iter().any(|s| s == "idempotencykey")
}

/// Any segment of `name` is in `vocabulary`
pub fn has_segment(name: &str, vocabulary: &[&str]) -> bool {
    name_segments(name)
        .iter()
        .any(|s| vocabulary.contains(&s.as_str()))
}
