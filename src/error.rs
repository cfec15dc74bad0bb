/*!
Defines the [ParqueError] and [Result] types used throughout the crate.
*/

use serde::Serialize;
use thiserror::Error;

/// ParqueDB error type, covering the storage, concurrency, validation,
/// integrity and resource error families described in the error taxonomy.
#[derive(Error, Debug)]
pub enum ParqueError {
    /// The requested path does not exist in the storage backend.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conditional write lost a compare-and-swap race on an ETag.
    #[error("etag mismatch on {path}")]
    ETagMismatch {
        /// Path whose precondition failed.
        path: String,
    },

    /// The per-namespace commit lock could not be acquired in time.
    #[error("write lock timeout for namespace {ns} after {timeout_ms}ms")]
    WriteLockTimeout {
        /// Namespace whose lock was contended.
        ns: String,
        /// Configured timeout that elapsed.
        timeout_ms: u64,
    },

    /// A write operation was attempted against a read-only database/executor.
    #[error("database is read-only")]
    ReadOnly,

    /// A queue has reached its configured capacity.
    #[error("backpressure on {namespace} ({operation}): {current_size}/{max_size}")]
    Backpressure {
        /// Size of the queue at rejection time.
        current_size: usize,
        /// Configured maximum queue size.
        max_size: usize,
        /// Operation that triggered the append.
        operation: String,
        /// Namespace whose queue is full.
        namespace: String,
    },

    /// `expectedVersion` did not match the entity's stored version.
    #[error("version conflict on {target}: expected {expected}, found {found}")]
    VersionConflict {
        /// Target entity identifier.
        target: String,
        /// Version the caller expected.
        expected: u64,
        /// Version actually stored.
        found: u64,
    },

    /// Commit retries were exhausted without landing a compare-and-swap.
    #[error("commit conflict on namespace {ns} after {attempts} attempts")]
    CommitConflict {
        /// Namespace whose commit could not land.
        ns: String,
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// A sync or branch manifest failed to parse.
    #[error("corrupted {which} manifest: {message}")]
    CorruptedManifest {
        /// Which side's manifest failed to parse ("local" or "remote").
        which: &'static str,
        /// Description of the parse failure.
        message: String,
    },

    /// An archive path did not match the expected `archive/YYYY/MM/seg-NNNN.parquet` shape.
    #[error("invalid archive path: {0}")]
    InvalidArchivePath(String),

    /// The operation was cancelled via an abort signal.
    #[error("aborted")]
    Aborted,

    /// A generic object-store operation failed.
    #[error("bucket operation {operation} failed on {path}")]
    BucketOperationError {
        /// The failing operation name (read/write/list/delete/exists).
        operation: &'static str,
        /// Path the operation targeted.
        path: String,
    },

    /// The named bucket/container does not exist or is not configured.
    #[error("missing bucket: {name}")]
    MissingBucket {
        /// Name of the bucket that could not be resolved.
        name: String,
    },

    /// Content failed to decode as a valid entity, event, or index entry.
    #[error("decode error: {0}")]
    Decode(String),

    /// Catch-all for lower-level failures that do not need first-class handling.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// ParqueDB result type.
pub type Result<T> = std::result::Result<T, ParqueError>;

/// Closed set of error codes used by the transport envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// See [ParqueError::NotFound].
    NotFound,
    /// See [ParqueError::ETagMismatch].
    ETagMismatch,
    /// See [ParqueError::WriteLockTimeout].
    WriteLockTimeout,
    /// See [ParqueError::ReadOnly].
    ReadOnly,
    /// See [ParqueError::Backpressure].
    Backpressure,
    /// See [ParqueError::VersionConflict].
    VersionConflict,
    /// See [ParqueError::CommitConflict].
    CommitConflict,
    /// See [ParqueError::CorruptedManifest].
    CorruptedManifest,
    /// See [ParqueError::InvalidArchivePath].
    InvalidArchivePath,
    /// See [ParqueError::Aborted].
    Aborted,
    /// See [ParqueError::BucketOperationError].
    BucketOperationError,
    /// See [ParqueError::MissingBucket].
    MissingBucket,
    /// See [ParqueError::Decode].
    Decode,
    /// See [ParqueError::Other].
    Other,
}

/// Wire envelope for an error, following the `{code, name, context}` shape.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    /// Closed-set error code.
    pub code: ErrorCode,
    /// Display name of the Rust variant.
    pub name: &'static str,
    /// Free-form structured context for the error.
    pub context: serde_json::Value,
}

impl ParqueError {
    /// Serialize this error into the transport envelope described in spec §7.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        use serde_json::json;
        match self {
            ParqueError::NotFound(path) => ErrorEnvelope {
                code: ErrorCode::NotFound,
                name: "NotFound",
                context: json!({ "path": path }),
            },
            ParqueError::ETagMismatch { path } => ErrorEnvelope {
                code: ErrorCode::ETagMismatch,
                name: "ETagMismatch",
                context: json!({ "path": path }),
            },
            ParqueError::WriteLockTimeout { ns, timeout_ms } => ErrorEnvelope {
                code: ErrorCode::WriteLockTimeout,
                name: "WriteLockTimeout",
                context: json!({ "ns": ns, "timeoutMs": timeout_ms }),
            },
            ParqueError::ReadOnly => ErrorEnvelope {
                code: ErrorCode::ReadOnly,
                name: "ReadOnly",
                context: json!({}),
            },
            ParqueError::Backpressure {
                current_size,
                max_size,
                operation,
                namespace,
            } => ErrorEnvelope {
                code: ErrorCode::Backpressure,
                name: "Backpressure",
                context: json!({
                    "currentSize": current_size,
                    "maxSize": max_size,
                    "operation": operation,
                    "namespace": namespace,
                }),
            },
            ParqueError::VersionConflict {
                target,
                expected,
                found,
            } => ErrorEnvelope {
                code: ErrorCode::VersionConflict,
                name: "VersionConflict",
                context: json!({ "target": target, "expected": expected, "found": found }),
            },
            ParqueError::CommitConflict { ns, attempts } => ErrorEnvelope {
                code: ErrorCode::CommitConflict,
                name: "CommitConflict",
                context: json!({ "ns": ns, "attempts": attempts }),
            },
            ParqueError::CorruptedManifest { which, message } => ErrorEnvelope {
                code: ErrorCode::CorruptedManifest,
                name: "CorruptedManifest",
                context: json!({ "which": which, "message": message }),
            },
            ParqueError::InvalidArchivePath(path) => ErrorEnvelope {
                code: ErrorCode::InvalidArchivePath,
                name: "InvalidArchivePath",
                context: json!({ "path": path }),
            },
            ParqueError::Aborted => ErrorEnvelope {
                code: ErrorCode::Aborted,
                name: "Aborted",
                context: json!({}),
            },
            ParqueError::BucketOperationError { operation, path } => ErrorEnvelope {
                code: ErrorCode::BucketOperationError,
                name: "BucketOperationError",
                context: json!({ "operation": operation, "path": path }),
            },
            ParqueError::MissingBucket { name } => ErrorEnvelope {
                code: ErrorCode::MissingBucket,
                name: "MissingBucket",
                context: json!({ "name": name }),
            },
            ParqueError::Decode(message) => ErrorEnvelope {
                code: ErrorCode::Decode,
                name: "Decode",
                context: json!({ "message": message }),
            },
            ParqueError::Other(err) => ErrorEnvelope {
                code: ErrorCode::Other,
                name: "Other",
                context: json!({ "message": err.to_string() }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backpressure_envelope_matches_shape() {
        let err = ParqueError::Backpressure {
            current_size: 2,
            max_size: 2,
            operation: "CREATE".to_string(),
            namespace: "posts".to_string(),
        };
        let envelope = err.to_envelope();
        assert_eq!(envelope.name, "Backpressure");
        assert_eq!(envelope.context["namespace"], "posts");
    }
}
