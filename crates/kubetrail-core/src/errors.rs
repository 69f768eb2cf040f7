use kubetrail_core_types::RequestId;
use thiserror::Error;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that callers can match on without
/// parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExErrorKind {
    // Per-item input problems
    /// A raw resource document lacks kind/name or is not an object
    MalformedResource,
    InvalidInput,
    /// A retention or stability window is zero, negative or unparseable
    InvalidWindow,
    InvalidConfig,

    // Lookup
    NotFound,

    // Storage
    /// The backing store cannot be opened or locked
    StoreUnavailable,
    /// Exclusive write access was not obtained within the lock timeout
    WriteContention,
    Persistence,
    MigrationChecksum,

    // Integration/IO
    Io,
    Serialization,

    // Control flow
    Cancelled,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::MalformedResource => "ERR_MALFORMED_RESOURCE",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::InvalidWindow => "ERR_INVALID_WINDOW",
            ExErrorKind::InvalidConfig => "ERR_INVALID_CONFIG",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::StoreUnavailable => "ERR_STORE_UNAVAILABLE",
            ExErrorKind::WriteContention => "ERR_WRITE_CONTENTION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::MigrationChecksum => "ERR_MIGRATION_CHECKSUM",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Cancelled => "ERR_CANCELLED",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether a caller may retry the failed operation unchanged (with backoff)
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExErrorKind::WriteContention)
    }
}

/// Canonical structured error type
///
/// Carries a classification for programmatic handling plus optional context
/// (operation, entity, scan id, correlation id) for diagnostics.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    scan_id: Option<i64>,
    request_id: Option<RequestId>,
    message: String,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            scan_id: None,
            request_id: None,
            message: String::new(),
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity context (usually a resource identity rendered as `kind/ns/name`)
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add scan id context
    pub fn with_scan_id(mut self, scan_id: i64) -> Self {
        self.scan_id = Some(scan_id);
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the entity context, if any
    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    /// Get the scan id context, if any
    pub fn scan_id(&self) -> Option<i64> {
        self.scan_id
    }

    /// Get the request ID context, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Shorthand for `self.kind().is_retryable()`
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        if let Some(scan_id) = self.scan_id {
            write!(f, " (scan_id: {})", scan_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {}

impl From<serde_json::Error> for ExError {
    fn from(err: serde_json::Error) -> Self {
        ExError::new(ExErrorKind::Serialization).with_message(err.to_string())
    }
}

// ========== End Error Facility ==========

/// Why a single raw resource document could not be normalized
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// Document root is not a JSON object
    #[error("resource document must be an object, got {found}")]
    NotAnObject { found: &'static str },

    /// `kind` is absent, empty or not a string
    #[error("resource document has no kind")]
    MissingKind,

    /// `metadata.name` is absent, empty or not a string
    #[error("resource document of kind {kind} has no metadata.name")]
    MissingName { kind: String },

    /// `metadata.namespace` is present but not a string
    #[error("resource {kind}/{name} has a non-string metadata.namespace")]
    InvalidNamespace { kind: String, name: String },

    /// Same identity already seen earlier in the same scan
    #[error("duplicate identity {identity} in one scan")]
    DuplicateIdentity { identity: String },
}

impl From<NormalizeError> for ExError {
    fn from(err: NormalizeError) -> Self {
        let entity = match &err {
            NormalizeError::MissingName { kind } => Some(kind.clone()),
            NormalizeError::InvalidNamespace { kind, name } => Some(format!("{}/{}", kind, name)),
            NormalizeError::DuplicateIdentity { identity } => Some(identity.clone()),
            NormalizeError::NotAnObject { .. } | NormalizeError::MissingKind => None,
        };
        let ex = ExError::new(ExErrorKind::MalformedResource)
            .with_op("normalize")
            .with_message(err.to_string());
        match entity {
            Some(e) => ex.with_entity_id(e),
            None => ex,
        }
    }
}

/// Build an `InvalidWindow` error
pub fn invalid_window(op: &str, reason: impl Into<String>) -> ExError {
    ExError::new(ExErrorKind::InvalidWindow)
        .with_op(op.to_string())
        .with_message(reason)
}

/// Build a `Cancelled` error
pub fn cancelled(op: &str) -> ExError {
    ExError::new(ExErrorKind::Cancelled)
        .with_op(op.to_string())
        .with_message("operation cancelled before completion")
}
