use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("sheet '{0}' not found")]
    MissingSheet(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("one or both snapshots not found ({date1}, {date2})")]
    SnapshotNotFound { date1: String, date2: String },
    #[error("failed to deliver mail to {to}: {reason}")]
    Delivery { to: String, reason: String },
    #[error("no student data found in '{0}'")]
    EmptyRoster(String),
    #[error("invalid column reference '{0}'")]
    InvalidColumn(String),
    #[error("failed to encode dashboard data: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type HubResult<T> = Result<T, HubError>;
