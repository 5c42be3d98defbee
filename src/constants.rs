/// Constants module to avoid magic numbers in the codebase

// Network Configuration
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8787/v1";
pub const DEFAULT_CREDENTIAL_ENV: &str = "THREADLINE_API_KEY";
pub const DEFAULT_ASSISTANT_ENV: &str = "THREADLINE_ASSISTANT_ID";
pub const CONFIG_ENV_PREFIX: &str = "THREADLINE_";

// Timeouts
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 3;

// Retrieval
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

// Errors
pub const ERROR_BODY_PREVIEW_CHARS: usize = 200;

// UI Configuration
pub const SESSION_TITLE_PREVIEW_CHARS: usize = 60;
pub const LOCAL_MESSAGE_PREFIX: &str = "local-";
