use thiserror::Error;

/// Canonical error taxonomy shared by the compiler crates.
///
/// Classification guidance:
/// - [`BwqError::Planning`]: structural rejections found while compiling a search
/// - [`BwqError::Unsupported`]: well-formed requests the compiler refuses on purpose
/// - [`BwqError::Execution`]: failures reported by the relational executor
/// - [`BwqError::Storage`]: derived-table cache failures other than creation races
/// - [`BwqError::TableExists`]: create-if-absent lost a race, callers treat it as a hit
/// - [`BwqError::InvalidConfig`]: configuration or request-shape contract violations
/// - [`BwqError::Io`]: raw filesystem failures from std APIs
#[derive(Debug, Error)]
pub enum BwqError {
    /// Invalid configuration or malformed request shape.
    ///
    /// Examples:
    /// - `search_limits` value that is neither an object nor a list of objects
    /// - boolean or null literal in a constraint
    /// - unreadable configuration file contents
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Compilation failures.
    ///
    /// Examples:
    /// - field name with characters outside `[A-Za-z0-9_$*]`
    /// - unknown statistic or comparison operator
    /// - cyclic or overlong table dependency chain
    #[error("planning error: {0}")]
    Planning(String),

    /// Executor failures after compilation succeeded.
    #[error("execution error: {0}")]
    Execution(String),

    /// Derived-table cache failures.
    #[error("storage error: {0}")]
    Storage(String),

    /// A table with this name already exists.
    #[error("table already exists: {0}")]
    TableExists(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Valid request for a shape the compiler does not implement.
    ///
    /// Examples:
    /// - phrases longer than two words
    /// - trigram grouping markers
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Standard result alias.
pub type Result<T> = std::result::Result<T, BwqError>;
