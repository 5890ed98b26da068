use std::env;
use std::str::FromStr;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub request: RequestConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

/// Completion server configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stop: Vec<String>,
}

/// Document store configuration
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub base_url: String,
    pub collection: String,
    pub top_k: usize,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Workflow tuning knobs
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Default bound on query rewrites in the correction loop.
    pub max_retries: u32,
    /// Characters of each document shown to the grader.
    pub grade_preview_chars: usize,
    /// Characters of each source returned to callers.
    pub source_preview_chars: usize,
    /// Minimum message length before it is taken as a problem statement.
    pub problem_statement_min_chars: usize,
    /// Capacity of the event channel behind streaming queries.
    pub stream_buffer: usize,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let llm = LlmConfig {
            base_url: normalize_llm_url(
                &env::var("LLM_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            ),
            model_name: env::var("LLM_MODEL_NAME")
                .unwrap_or_else(|_| "mistral-7b-instruct-v0.2.q5_k_m.gguf".to_string()),
            temperature: parse_env("LLM_TEMPERATURE", 0.7),
            max_tokens: parse_env("LLM_MAX_TOKENS", 512),
            stop: match env::var("LLM_STOP") {
                Ok(raw) => parse_stop_sequences(&raw),
                Err(_) => default_stop_sequences(),
            },
        };

        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(AppError::Config {
                message: format!(
                    "LLM_TEMPERATURE must be between 0.0 and 2.0, got {}",
                    llm.temperature
                ),
            });
        }

        let retrieval = RetrievalConfig {
            base_url: env::var("RETRIEVAL_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string())
                .trim_end_matches('/')
                .to_string(),
            collection: env::var("RETRIEVAL_COLLECTION")
                .unwrap_or_else(|_| "course_materials".to_string()),
            top_k: parse_env("RETRIEVAL_TOP_K", 1),
        };

        let request = RequestConfig {
            timeout_ms: parse_env("REQUEST_TIMEOUT_MS", 300_000),
            max_retries: parse_env("MAX_RETRIES", 0),
            retry_delay_ms: parse_env("RETRY_DELAY_MS", 1000),
        };

        let workflow = WorkflowConfig {
            max_retries: parse_env("WORKFLOW_MAX_RETRIES", 2),
            grade_preview_chars: parse_env("GRADE_PREVIEW_CHARS", 300),
            source_preview_chars: parse_env("SOURCE_PREVIEW_CHARS", 200),
            problem_statement_min_chars: parse_env("PROBLEM_STATEMENT_MIN_CHARS", 20),
            stream_buffer: parse_env::<usize>("STREAM_BUFFER", 64).max(1),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(Config {
            llm,
            retrieval,
            request,
            workflow,
            logging,
        })
    }
}

/// Parse an env var, falling back to `default` when unset or unparsable.
fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// The completion client appends `/v1/...` itself.
fn normalize_llm_url(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('/');
    trimmed
        .strip_suffix("/v1")
        .unwrap_or(trimmed)
        .to_string()
}

fn parse_stop_sequences(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.replace("\\n", "\n"))
        .filter(|s| !s.is_empty())
        .collect()
}

fn default_stop_sequences() -> Vec<String> {
    vec!["\n\n".to_string()]
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            model_name: "mistral-7b-instruct-v0.2.q5_k_m.gguf".to_string(),
            temperature: 0.7,
            max_tokens: 512,
            stop: default_stop_sequences(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            collection: "course_materials".to_string(),
            top_k: 1,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 300_000,
            max_retries: 0,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            grade_preview_chars: 300,
            source_preview_chars: 200,
            problem_statement_min_chars: 20,
            stream_buffer: 64,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
