//! Call-target vocabulary: which Python calls touch the outside world,
//! and which ones are log calls.

use crate::metrics::names::name_segments;
use crate::symbols::{HttpMethod, SideEffect, SideEffectKind};

/// Libraries whose module-level functions do HTTP
const HTTP_LIBS: &[&str] = &[
    "requests", "httpx", "aiohttp", "urllib", "urllib3", "http", "grequests", "treq",
];

/// Head nouns that mark an HTTP client object (`api_client`, `self._session`)
const HTTP_RECEIVERS: &[&str] = &["session", "client", "http", "api"];

/// Head nouns that mark a database handle (`db_conn`, `user_repo`)
const DB_RECEIVERS: &[&str] = &[
    "cursor", "conn", "connection", "db", "database", "engine", "collection", "repo",
    "repository", "redis", "cache",
];

const DB_LIBS: &[&str] = &[
    "sqlite3", "psycopg", "psycopg2", "pymysql", "pymongo", "sqlalchemy", "asyncpg", "redis",
    "aiosqlite", "motor",
];

const DB_METHODS: &[&str] = &[
    "execute", "executemany", "executescript", "fetchone", "fetchall", "fetchmany", "commit",
    "rollback", "query", "find", "find_one", "insert_one", "insert_many", "update_one",
    "update_many", "delete_one", "delete_many", "aggregate", "scalars",
];

const FILE_METHODS: &[&str] = &["read_text", "write_text", "read_bytes", "write_bytes"];

const OS_FILE_FUNCTIONS: &[&str] = &[
    "remove", "unlink", "rename", "replace", "makedirs", "mkdir", "rmdir", "listdir", "scandir",
    "walk",
];

/// Libraries that never block the event loop
const ASYNC_LIBS: &[&str] = &["asyncio", "trio", "anyio", "aiohttp", "aiofiles", "aiosqlite"];

const LOG_LEVELS: &[&str] = &[
    "debug", "info", "warning", "warn", "error", "exception", "critical", "fatal", "log",
];

/// Where a call sits, as far as blocking is concerned
#[derive(Debug, Clone, Copy, Default)]
pub struct CallContext {
    pub awaited: bool,
    /// Inside an `async with` item or body
    pub async_with: bool,
}

struct Target<'a> {
    parts: Vec<String>,
    raw: &'a str,
}

impl<'a> Target<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            parts: raw.split('.').map(str::to_lowercase).collect(),
            raw,
        }
    }

    fn short(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or("")
    }

    fn root(&self) -> &str {
        self.parts.first().map(String::as_str).unwrap_or("")
    }

    fn receiver(&self) -> &[String] {
        &self.parts[..self.parts.len().saturating_sub(1)]
    }

    /// Last receiver segment, without leading underscores
    fn receiver_name(&self) -> &str {
        self.receiver()
            .last()
            .map(|s| s.trim_start_matches('_'))
            .unwrap_or("")
    }

    /// Name segments of the last receiver, as written (`httpClient` splits)
    fn receiver_segments(&self) -> Vec<String> {
        self.raw
            .rsplit('.')
            .nth(1)
            .map(name_segments)
            .unwrap_or_default()
    }

    /// The receiver's head noun is one of `nouns`: `api_client` is a client,
    /// `client_config` is a config
    fn receiver_is(&self, nouns: &[&str]) -> bool {
        self.receiver_segments()
            .last()
            .is_some_and(|head| nouns.contains(&head.as_str()))
    }

    /// Any segment of the receiver is one of `nouns`
    fn receiver_mentions(&self, nouns: &[&str]) -> bool {
        self.receiver_segments()
            .iter()
            .any(|s| nouns.contains(&s.as_str()))
    }

    fn is_async_lib(&self) -> bool {
        ASYNC_LIBS.contains(&self.root())
    }
}

/// Side effect performed by a call, if any.
///
/// `method_hint` is the HTTP verb passed as an argument to generic
/// `request(...)` calls.
pub fn classify(target: &str, method_hint: Option<&str>, ctx: CallContext) -> Option<SideEffect> {
    let t = Target::new(target);
    let short = t.short();
    let blocking = !ctx.awaited && !ctx.async_with && !t.is_async_lib();

    let effect = |kind: SideEffectKind| {
        let e = SideEffect::new(kind, t.raw, 0);
        if blocking {
            e.blocking()
        } else {
            e
        }
    };

    if short == "sleep" {
        return Some(effect(SideEffectKind::Sleep));
    }

    if t.root() == "subprocess"
        || matches!(t.raw, "os.system" | "os.popen")
        || (t.root() == "os" && (short.starts_with("spawn") || short.starts_with("exec")))
        || matches!(short, "create_subprocess_exec" | "create_subprocess_shell")
    {
        return Some(effect(SideEffectKind::Process));
    }

    let db_call = DB_METHODS.contains(&short)
        && (t.receiver_is(DB_RECEIVERS) || t.receiver_is(&["session"]));
    if db_call || (DB_LIBS.contains(&t.root()) && short == "connect") {
        return Some(effect(SideEffectKind::Database));
    }

    if short == "urlopen" {
        return Some(effect(SideEffectKind::Network));
    }

    let http_receiver = HTTP_LIBS.contains(&t.root()) || t.receiver_is(HTTP_RECEIVERS);
    if http_receiver && !t.receiver_mentions(DB_RECEIVERS) {
        let method = if matches!(short, "request" | "stream" | "send") {
            Some(method_hint.and_then(HttpMethod::from_name))
        } else {
            HttpMethod::from_name(short).map(Some)
        };
        if let Some(method) = method {
            let mut e = effect(SideEffectKind::Network);
            e.method = method;
            return Some(e);
        }
    }

    let file_io = t.raw == "open"
        || matches!(t.raw, "io.open" | "os.open" | "codecs.open")
        || FILE_METHODS.contains(&short)
        || t.root() == "shutil"
        || t.root() == "aiofiles"
        || (t.root() == "os" && OS_FILE_FUNCTIONS.contains(&short));
    if file_io {
        return Some(effect(SideEffectKind::FileIo));
    }

    None
}

/// `logger.info(...)`, `self.log.warning(...)`, `logging.error(...)`
pub fn log_level(target: &str) -> Option<String> {
    let t = Target::new(target);
    let short = t.short();
    if !LOG_LEVELS.contains(&short) {
        return None;
    }
    let receiver = t.receiver_name();
    let is_logger = receiver == "log"
        || receiver == "logs"
        || receiver == "logging"
        || receiver == "structlog"
        || receiver.ends_with("logger")
        || receiver.ends_with("_log");
    if !is_logger {
        return None;
    }
    Some(if short == "warn" { "warning" } else { short }.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(target: &str) -> Option<SideEffectKind> {
        classify(target, None, CallContext::default()).map(|e| e.kind)
    }

    #[test]
    fn test_network_targets() {
        let post = classify("requests.post", None, CallContext::default()).expect("network");
        assert_eq!(post.kind, SideEffectKind::Network);
        assert_eq!(post.method, Some(HttpMethod::Post));
        assert!(post.blocking);

        let awaited = classify(
            "self._session.get",
            None,
            CallContext {
                awaited: true,
                ..Default::default()
            },
        )
        .expect("network");
        assert_eq!(awaited.method, Some(HttpMethod::Get));
        assert!(!awaited.blocking);

        let generic = classify("self.client.request", Some("PATCH"), CallContext::default())
            .expect("network");
        assert_eq!(generic.method, Some(HttpMethod::Patch));

        assert_eq!(kind("urllib.request.urlopen"), Some(SideEffectKind::Network));
        assert_eq!(kind("config.get"), None);
        assert_eq!(kind("self.cache.get"), None);
        assert_eq!(kind("redis_client.get"), None);
    }

    #[test]
    fn test_http_receiver_by_head_noun() {
        assert_eq!(kind("api_client.get"), Some(SideEffectKind::Network));
        assert_eq!(kind("self.http_session.post"), Some(SideEffectKind::Network));
        assert_eq!(kind("self.httpClient.put"), Some(SideEffectKind::Network));
        assert_eq!(kind("self.api.delete"), Some(SideEffectKind::Network));

        assert_eq!(kind("api_response.get"), None);
        assert_eq!(kind("client_config.get"), None);
        assert_eq!(kind("capital.get"), None);
        assert_eq!(kind("self.session_state.get"), None);
    }

    #[test]
    fn test_db_receiver_by_head_noun() {
        assert_eq!(kind("db_conn.execute"), Some(SideEffectKind::Database));
        assert_eq!(kind("self.dbConnection.commit"), Some(SideEffectKind::Database));
        assert_eq!(kind("db_session.execute"), Some(SideEffectKind::Database));
        assert_eq!(kind("concern.execute"), None);
        assert_eq!(kind("repo_name.find"), None);
    }

    #[test]
    fn test_other_effects() {
        assert_eq!(kind("time.sleep"), Some(SideEffectKind::Sleep));
        assert!(!classify("asyncio.sleep", None, CallContext::default())
            .expect("sleep")
            .blocking);
        assert_eq!(kind("subprocess.run"), Some(SideEffectKind::Process));
        assert_eq!(kind("cursor.execute"), Some(SideEffectKind::Database));
        assert_eq!(kind("sqlite3.connect"), Some(SideEffectKind::Database));
        assert_eq!(kind("open"), Some(SideEffectKind::FileIo));
        assert_eq!(kind("path.write_text"), Some(SideEffectKind::FileIo));
        assert_eq!(kind("json.dumps"), None);
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(log_level("logger.info").as_deref(), Some("info"));
        assert_eq!(log_level("self._logger.warn").as_deref(), Some("warning"));
        assert_eq!(log_level("logging.error").as_deref(), Some("error"));
        assert_eq!(log_level("math.log"), None);
        assert_eq!(log_level("result.info"), None);
    }
}
