/// Failure to read or write a persisted list (tasks or comparison schedules).
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("store I/O failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize store contents: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The stored file exists but cannot be trusted (unparseable or the
    /// checksum does not match its contents).
    #[error("store {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Errors returned to callers of the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The requested execution time could not be parsed.
    #[error("invalid scheduled time {input:?}: {reason}")]
    InvalidTime { input: String, reason: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Why an execution callback did not complete successfully.
///
/// Recorded on the task as its `error`; never propagated to the caller that
/// scheduled it.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("{0}")]
    Callback(String),

    #[error("execution request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("execution did not settle within {0:?}")]
    Timeout(std::time::Duration),
}

/// Failure to fetch a configuration tree for comparison.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("no configuration found for {key:?} in {location}")]
    NotFound { key: String, location: String },

    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing configuration for {key:?}: {reason}")]
    Parse { key: String, reason: String },

    #[error("fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no {0} configuration source is configured")]
    Unconfigured(&'static str),
}

/// Errors returned when managing comparison schedules.
#[derive(Debug, thiserror::Error)]
pub enum ComparisonScheduleError {
    #[error("a comparison schedule needs at least one device")]
    NoDevices,

    #[error("device targets need a non-empty id and address")]
    InvalidDevice,

    /// Neither or both of an interval and a cron expression were given.
    #[error("set exactly one of a positive interval or a cron expression")]
    InvalidCadence,

    #[error("invalid cron expression {expr:?}: {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
