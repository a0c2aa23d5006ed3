// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "AgentMark";

/// Application name in lowercase (for paths, identifiers and log filters)
pub const APP_NAME_LOWER: &str = "agentmark";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".agentmark";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "agentmark.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "AGENTMARK_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "AGENTMARK_LOG";

// =============================================================================
// Environment Variables - Backend
// =============================================================================

/// Environment variable for the backend base URL
pub const ENV_BACKEND_URL: &str = "AGENTMARK_BACKEND_URL";

/// Environment variable for the backend request timeout in seconds
pub const ENV_BACKEND_TIMEOUT_SECS: &str = "AGENTMARK_BACKEND_TIMEOUT_SECS";

/// Environment variable for the model API key forwarded to the backend
pub const ENV_API_KEY: &str = "AGENTMARK_API_KEY";

/// Fallback API key variable understood by the backend itself
pub const ENV_DEEPSEEK_API_KEY: &str = "DEEPSEEK_API_KEY";

/// Environment variable for the default payload bitstring
pub const ENV_PAYLOAD: &str = "AGENTMARK_PAYLOAD";

// =============================================================================
// Session Defaults
// =============================================================================

/// Default payload hidden in the primary track
pub const DEFAULT_PAYLOAD: &str = "1101";

/// Default evaluation language
pub const DEFAULT_LANGUAGE: &str = "en";

/// Task name of trajectories produced by a live session
pub const LIVE_TASK_NAME: &str = "Live Execution";

/// Title of a freshly started live session
pub const LIVE_SESSION_TITLE: &str = "Live Session";

/// Title (and task name) of an empty draft conversation
pub const NEW_CHAT_TITLE_EN: &str = "New Chat";
pub const NEW_CHAT_TITLE_ZH: &str = "新对话";

/// Title of the synthetic trajectory shown before anything is selected
pub const NEW_SESSION_TITLE_EN: &str = "New Session";
pub const NEW_SESSION_TITLE_ZH: &str = "新会话";

/// Title shown when the active selection was cleared
pub const NO_CONVERSATION_TITLE_EN: &str = "No Conversation";
pub const NO_CONVERSATION_TITLE_ZH: &str = "无对话";

/// Placeholder text shown in a track until its first thought chunk arrives
pub const THINKING_PLACEHOLDER: &str = "Thinking...";

/// Characters of the first message kept in a derived title
pub const TITLE_PREVIEW_CHARS: usize = 30;

// =============================================================================
// Playback
// =============================================================================

/// Auto-play period between advances
pub const DEFAULT_AUTOPLAY_INTERVAL_MS: u64 = 2000;

/// Quiet window before an auto-save write is issued
pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 500;

/// How long the CLI waits for a pending auto-save before exiting
pub const AUTOSAVE_FLUSH_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// History
// =============================================================================

/// Collection scope the dashboard lists
pub const DEFAULT_HISTORY_SCOPE: &str = "benchmark";

/// Id of the synthetic trajectory shown before anything is selected
pub const EMPTY_TRAJECTORY_ID: &str = "empty-initial";

// =============================================================================
// Erasure
// =============================================================================

/// Default erasure rate (percent)
pub const DEFAULT_ERASURE_RATE: u32 = 0;

/// Upper bound of the erasure rate (percent)
pub const MAX_ERASURE_RATE: u32 = 100;
