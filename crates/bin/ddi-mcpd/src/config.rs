use clap::{Parser, builder::BoolishValueParser};
use ddi_core::query::RegexAnchoring;
use ddi_mcp::server::McpHttpServerConfig;
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_WAPI_VERSION: &str = "v2.13.1";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_MS: u64 = 500;
const DEFAULT_DISCOVERY_CONCURRENCY: usize = 8;
const DEFAULT_CACHE_DIR: &str = ".ddi-mcp";
const CUSTOM_HANDLERS_FILE: &str = "custom_handlers.json";
const DEFAULT_DB_ENDPOINT: &str = "mem://";
const DEFAULT_DB_NAMESPACE: &str = "ddi";
const DEFAULT_DB_DATABASE: &str = "knowledge";
const DEFAULT_FIELD_DOC_CAP: usize = 20;
const DEFAULT_TOP_K: usize = 5;
const DEFAULT_MCP_HTTP_ADDR: &str = "127.0.0.1:4020";
const DEFAULT_SSE_KEEP_ALIVE_SECS: u64 = 15;

#[derive(Parser, Debug)]
#[command(name = "ddi-mcpd", version, about = "DDI MCP daemon.")]
#[allow(clippy::struct_excessive_bools)]
struct CliArgs {
    #[arg(long, env = "DDI_WAPI_HOST")]
    wapi_host: Option<String>,

    #[arg(long, env = "DDI_WAPI_USERNAME")]
    wapi_username: Option<String>,

    #[arg(long, env = "DDI_WAPI_PASSWORD", hide_env_values = true)]
    wapi_password: Option<String>,

    #[arg(long, env = "DDI_WAPI_VERSION", default_value = DEFAULT_WAPI_VERSION)]
    wapi_version: String,

    #[arg(
        long,
        env = "DDI_VERIFY_TLS",
        default_value_t = true,
        value_parser = BoolishValueParser::new()
    )]
    verify_tls: bool,

    #[arg(long, env = "DDI_CA_BUNDLE")]
    ca_bundle: Option<PathBuf>,

    #[arg(
        long,
        env = "DDI_REQUEST_TIMEOUT_SECS",
        default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS
    )]
    request_timeout_secs: u64,

    #[arg(long, env = "DDI_RETRY_ATTEMPTS", default_value_t = DEFAULT_RETRY_ATTEMPTS)]
    retry_attempts: u32,

    #[arg(long, env = "DDI_RETRY_BASE_MS", default_value_t = DEFAULT_RETRY_BASE_MS)]
    retry_base_ms: u64,

    #[arg(
        long,
        env = "DDI_DISCOVERY_CONCURRENCY",
        default_value_t = DEFAULT_DISCOVERY_CONCURRENCY
    )]
    discovery_concurrency: usize,

    /// Comma-separated resource types used when the remote cannot enumerate them.
    #[arg(long, env = "DDI_FALLBACK_TYPES")]
    fallback_types: Option<String>,

    #[arg(long, env = "DDI_CACHE_DIR", default_value = DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    #[arg(long, env = "DDI_CUSTOM_HANDLERS")]
    custom_handlers: Option<PathBuf>,

    #[arg(long, env = "DDI_CURATED_EXAMPLES")]
    curated_examples: Option<PathBuf>,

    #[arg(long, env = "DDI_DB_ENDPOINT", default_value = DEFAULT_DB_ENDPOINT)]
    db_endpoint: String,

    #[arg(long, env = "DDI_DB_USERNAME")]
    db_username: Option<String>,

    #[arg(long, env = "DDI_DB_PASSWORD", hide_env_values = true)]
    db_password: Option<String>,

    #[arg(long, env = "DDI_DB_NAMESPACE", default_value = DEFAULT_DB_NAMESPACE)]
    db_namespace: String,

    #[arg(long, env = "DDI_DB_DATABASE", default_value = DEFAULT_DB_DATABASE)]
    db_database: String,

    #[arg(long, env = "DDI_FIELD_DOC_CAP", default_value_t = DEFAULT_FIELD_DOC_CAP)]
    field_doc_cap: usize,

    #[arg(long, env = "DDI_RETRIEVAL_TOP_K", default_value_t = DEFAULT_TOP_K)]
    retrieval_top_k: usize,

    #[arg(long, env = "DDI_RETRIEVAL_MIN_RELEVANCE", default_value_t = 0.0)]
    retrieval_min_relevance: f32,

    #[arg(long, env = "DDI_REGEX_ANCHORING", default_value = "unanchored")]
    regex_anchoring: String,

    #[arg(
        long = "stdio",
        env = "DDI_ENABLE_STDIO",
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    enable_stdio: bool,

    #[arg(
        long,
        env = "DDI_MCP_SERVE",
        default_value_t = true,
        value_parser = BoolishValueParser::new()
    )]
    mcp_serve: bool,

    #[arg(long, env = "DDI_MCP_HTTP_ADDR", default_value = DEFAULT_MCP_HTTP_ADDR)]
    mcp_http_addr: SocketAddr,

    /// Serve streamable HTTP without MCP sessions.
    #[arg(
        long,
        env = "DDI_MCP_STATELESS",
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    mcp_stateless: bool,

    /// SSE keep-alive interval; 0 disables keep-alive pings.
    #[arg(
        long,
        env = "DDI_MCP_SSE_KEEP_ALIVE_SECS",
        default_value_t = DEFAULT_SSE_KEEP_ALIVE_SECS
    )]
    mcp_sse_keep_alive_secs: u64,

    #[arg(
        long,
        short = 'v',
        env = "DDI_VERBOSE",
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    verbose: bool,
}

/// Runtime configuration loaded from CLI arguments and environment variables.
#[derive(Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct DdiConfig {
    pub wapi_host: String,
    pub wapi_username: String,
    pub wapi_password: String,
    pub wapi_version: String,
    pub verify_tls: bool,
    pub ca_bundle: Option<PathBuf>,
    pub request_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub discovery_concurrency: usize,
    pub fallback_types: Vec<String>,
    pub cache_dir: PathBuf,
    pub custom_handlers: PathBuf,
    pub curated_examples: Option<PathBuf>,
    pub db_endpoint: String,
    pub db_username: Option<String>,
    pub db_password: Option<String>,
    pub db_namespace: String,
    pub db_database: String,
    pub field_doc_cap: usize,
    pub retrieval_top_k: usize,
    pub retrieval_min_relevance: f32,
    pub regex_anchoring: RegexAnchoring,
    pub enable_stdio: bool,
    pub mcp_serve: bool,
    pub mcp_http_addr: SocketAddr,
    pub mcp_stateful: bool,
    pub mcp_sse_keep_alive: Option<Duration>,
    pub verbose: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingSetting(&'static str),
    InvalidSetting { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSetting(name) => write!(f, "missing required setting: {name}"),
            Self::InvalidSetting { name, value } => {
                write!(f, "invalid {name} value: {value}")
            }
        }
    }
}

impl Error for ConfigError {}

impl DdiConfig {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::try_from(args)
    }

    pub fn db_in_memory(&self) -> bool {
        self.db_endpoint.starts_with("mem://")
    }

    #[must_use]
    pub fn http_server_config(&self) -> McpHttpServerConfig {
        McpHttpServerConfig::new(self.mcp_http_addr)
            .with_stateful_mode(self.mcp_stateful)
            .with_sse_keep_alive(self.mcp_sse_keep_alive)
    }
}

impl TryFrom<CliArgs> for DdiConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let wapi_host = required(args.wapi_host, "DDI_WAPI_HOST")?;
        let wapi_username = required(args.wapi_username, "DDI_WAPI_USERNAME")?;
        let wapi_password = required(args.wapi_password, "DDI_WAPI_PASSWORD")?;

        if args.wapi_version.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "DDI_WAPI_VERSION",
                value: args.wapi_version,
            });
        }
        if args.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "DDI_REQUEST_TIMEOUT_SECS",
                value: args.request_timeout_secs.to_string(),
            });
        }
        if args.discovery_concurrency == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "DDI_DISCOVERY_CONCURRENCY",
                value: args.discovery_concurrency.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&args.retrieval_min_relevance) {
            return Err(ConfigError::InvalidSetting {
                name: "DDI_RETRIEVAL_MIN_RELEVANCE",
                value: args.retrieval_min_relevance.to_string(),
            });
        }
        let regex_anchoring = args
            .regex_anchoring
            .parse::<RegexAnchoring>()
            .map_err(|_| ConfigError::InvalidSetting {
                name: "DDI_REGEX_ANCHORING",
                value: args.regex_anchoring.clone(),
            })?;

        let db_endpoint = args.db_endpoint.trim().to_string();
        if db_endpoint.is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "DDI_DB_ENDPOINT",
                value: args.db_endpoint,
            });
        }
        let db_username = args.db_username.filter(|value| !value.trim().is_empty());
        let db_password = args.db_password.filter(|value| !value.trim().is_empty());
        if !db_endpoint.starts_with("mem://") {
            if db_username.is_none() {
                return Err(ConfigError::MissingSetting("DDI_DB_USERNAME"));
            }
            if db_password.is_none() {
                return Err(ConfigError::MissingSetting("DDI_DB_PASSWORD"));
            }
        }
        if args.db_namespace.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "DDI_DB_NAMESPACE",
                value: args.db_namespace,
            });
        }

        let fallback_types = args
            .fallback_types
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let custom_handlers = args
            .custom_handlers
            .unwrap_or_else(|| args.cache_dir.join(CUSTOM_HANDLERS_FILE));

        Ok(Self {
            wapi_host,
            wapi_username,
            wapi_password,
            wapi_version: args.wapi_version,
            verify_tls: args.verify_tls,
            ca_bundle: args.ca_bundle,
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            retry_attempts: args.retry_attempts.max(1),
            retry_base_delay: Duration::from_millis(args.retry_base_ms),
            discovery_concurrency: args.discovery_concurrency,
            fallback_types,
            cache_dir: args.cache_dir,
            custom_handlers,
            curated_examples: args.curated_examples,
            db_endpoint,
            db_username,
            db_password,
            db_namespace: args.db_namespace,
            db_database: args.db_database,
            field_doc_cap: args.field_doc_cap,
            retrieval_top_k: args.retrieval_top_k,
            retrieval_min_relevance: args.retrieval_min_relevance,
            regex_anchoring,
            enable_stdio: args.enable_stdio,
            mcp_serve: args.mcp_serve,
            mcp_http_addr: args.mcp_http_addr,
            mcp_stateful: !args.mcp_stateless,
            mcp_sse_keep_alive: (args.mcp_sse_keep_alive_secs > 0)
                .then(|| Duration::from_secs(args.mcp_sse_keep_alive_secs)),
            verbose: args.verbose,
        })
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::MissingSetting(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs {
            wapi_host: Some("gm.example.net".to_string()),
            wapi_username: Some("admin".to_string()),
            wapi_password: Some("secret".to_string()),
            wapi_version: DEFAULT_WAPI_VERSION.to_string(),
            verify_tls: true,
            ca_bundle: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_ms: DEFAULT_RETRY_BASE_MS,
            discovery_concurrency: DEFAULT_DISCOVERY_CONCURRENCY,
            fallback_types: None,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            custom_handlers: None,
            curated_examples: None,
            db_endpoint: DEFAULT_DB_ENDPOINT.to_string(),
            db_username: None,
            db_password: None,
            db_namespace: DEFAULT_DB_NAMESPACE.to_string(),
            db_database: DEFAULT_DB_DATABASE.to_string(),
            field_doc_cap: DEFAULT_FIELD_DOC_CAP,
            retrieval_top_k: DEFAULT_TOP_K,
            retrieval_min_relevance: 0.0,
            regex_anchoring: "unanchored".to_string(),
            enable_stdio: false,
            mcp_serve: true,
            mcp_http_addr: DEFAULT_MCP_HTTP_ADDR.parse().expect("valid MCP addr"),
            mcp_stateless: false,
            mcp_sse_keep_alive_secs: DEFAULT_SSE_KEEP_ALIVE_SECS,
            verbose: false,
        }
    }

    #[test]
    fn defaults_parse_to_in_memory_store() {
        let config = DdiConfig::try_from(base_args()).expect("config should parse");
        assert!(config.db_in_memory());
        assert_eq!(config.regex_anchoring, RegexAnchoring::Unanchored);
        assert_eq!(
            config.custom_handlers,
            PathBuf::from(DEFAULT_CACHE_DIR).join(CUSTOM_HANDLERS_FILE)
        );
        assert!(config.fallback_types.is_empty());
    }

    #[test]
    fn requires_wapi_credentials() {
        let mut args = base_args();
        args.wapi_password = Some("  ".to_string());
        let err = DdiConfig::try_from(args).err().expect("password required");
        assert!(matches!(err, ConfigError::MissingSetting("DDI_WAPI_PASSWORD")));
    }

    #[test]
    fn remote_store_requires_credentials() {
        let mut args = base_args();
        args.db_endpoint = "ws://127.0.0.1:8000".to_string();
        let err = DdiConfig::try_from(args).err().expect("db credentials required");
        assert!(matches!(err, ConfigError::MissingSetting("DDI_DB_USERNAME")));
    }

    #[test]
    fn parses_fallback_types_and_anchoring() {
        let mut args = base_args();
        args.fallback_types = Some("network, record:a,,zone_auth".to_string());
        args.regex_anchoring = "anchored".to_string();
        let config = DdiConfig::try_from(args).expect("config should parse");
        assert_eq!(config.fallback_types, vec!["network", "record:a", "zone_auth"]);
        assert_eq!(config.regex_anchoring, RegexAnchoring::Anchored);

        let mut args = base_args();
        args.regex_anchoring = "sometimes".to_string();
        assert!(DdiConfig::try_from(args).is_err());
    }

    #[test]
    fn http_session_options_reach_server_config() {
        let config = DdiConfig::try_from(base_args()).expect("config should parse");
        let http = config.http_server_config();
        assert!(http.stateful_mode);
        assert_eq!(http.sse_keep_alive, Some(Duration::from_secs(DEFAULT_SSE_KEEP_ALIVE_SECS)));
        assert_eq!(http.addr, config.mcp_http_addr);

        let mut args = base_args();
        args.mcp_stateless = true;
        args.mcp_sse_keep_alive_secs = 0;
        let http = DdiConfig::try_from(args).expect("config should parse").http_server_config();
        assert!(!http.stateful_mode);
        assert_eq!(http.sse_keep_alive, None);
    }
}
