/// Centralized constants for parley.
/// Model names, endpoints, limits and storage names live here.

// ─── Models ───────────────────────────────────────────────────────────────────

pub mod models {
    pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
    pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";

    pub const OPENAI_MODELS: &[&str] = &[
        "gpt-4o",
        "gpt-4o-mini",
        "gpt-4-turbo",
        "gpt-4",
        "gpt-3.5-turbo",
    ];

    pub const ANTHROPIC_MODELS: &[&str] = &[
        "claude-3-5-sonnet-20241022",
        "claude-3-5-haiku-20241022",
        "claude-3-opus-20240229",
        "claude-3-sonnet-20240229",
        "claude-3-haiku-20240307",
    ];
}

// ─── API Endpoints ────────────────────────────────────────────────────────────

pub mod endpoints {
    pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
    pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
    pub const ANTHROPIC_VERSION: &str = "2023-06-01";
}

// ─── Environment Variables ────────────────────────────────────────────────────

pub mod env {
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
    pub const OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
    pub const ANTHROPIC_BASE_URL: &str = "ANTHROPIC_BASE_URL";
    pub const DEFAULT_PROVIDER: &str = "DEFAULT_PROVIDER";
    pub const DEFAULT_MODEL: &str = "DEFAULT_MODEL";
    pub const MAX_TOKENS: &str = "MAX_TOKENS";
    pub const TEMPERATURE: &str = "TEMPERATURE";
    pub const DATA_DIR: &str = "PARLEY_DATA_DIR";
    pub const TIMEOUT_SECS: &str = "PARLEY_TIMEOUT_SECS";
    pub const AUTOSAVE: &str = "PARLEY_AUTOSAVE";
}

// ─── Default Settings ─────────────────────────────────────────────────────────

pub mod defaults {
    pub const MAX_TOKENS: u32 = 1000;
    pub const TEMPERATURE: f32 = 0.7;
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const MEMORY_SEARCH_LIMIT: usize = 5;
    pub const BRANCH_SEARCH_LIMIT: usize = 5;
    /// Memories injected into a provider request per turn.
    pub const INJECTED_MEMORIES: usize = 3;
    pub const TITLE_MAX_CHARS: usize = 50;
    pub const ROOT_BRANCH_TITLE: &str = "main";
}

// ─── Memory Ranking ───────────────────────────────────────────────────────────

pub mod ranking {
    pub const TEXT_MATCH_WEIGHT: f32 = 0.7;
    pub const IMPORTANCE_WEIGHT: f32 = 0.3;

    // Branch search: per title hit, per matching tag, per matching message.
    pub const BRANCH_TITLE_WEIGHT: f32 = 3.0;
    pub const BRANCH_TAG_WEIGHT: f32 = 1.0;
    pub const BRANCH_MESSAGE_WEIGHT: f32 = 0.5;
}

// ─── Storage Layout ───────────────────────────────────────────────────────────

pub mod storage {
    pub const APP_DIR: &str = "parley";
    pub const SESSIONS_DIR: &str = "sessions";
    pub const CONTEXTS_DIR: &str = "contexts";
    pub const INDEX_FILE: &str = "index.json";
    pub const CONFIG_FILE: &str = "config.toml";
    pub const ENV_FILE: &str = ".env";
    pub const ENV_SAMPLE_FILE: &str = ".env.sample";
}
