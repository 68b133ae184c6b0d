use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Dependency cycle involving tasks: {}", .tasks.join(", "))]
    Cycle {
        /// Names of every task on a detected cycle.
        tasks: Vec<String>,
    },

    #[error("Graph cannot be staged, unresolvable tasks: {}", .tasks.join(", "))]
    Graph {
        /// Names of the tasks that could not be placed in any stage.
        tasks: Vec<String>,
    },

    #[error("Task {attempted} cannot be marked active while {active} is active")]
    ConcurrencyPolicy { active: String, attempted: String },

    #[error("Dispatch of task {task} timed out after {after:?}")]
    DispatchTimeout {
        task: String,
        after: std::time::Duration,
    },

    #[error("Dispatch of task {task} failed: {message}")]
    DispatchFailed { task: String, message: String },

    #[error("State corruption: {0}")]
    StateCorruption(String),

    #[error("Agent not available: {0}")]
    AgentNotAvailable(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

pub type Result<T> = std::result::Result<T, Error>;
