//! Field keys and event names of the operation log
//!
//! The `log_op_*` macros emit fields under exactly these names; log readers
//! (and the test capture) look them up here instead of repeating literals.

// Present on every operation event
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";

// `end` and `end_error`
pub const FIELD_DURATION_MS: &str = "duration_ms";

// Entities named by a command or carried by its error
pub const FIELD_REQUEST_ID: &str = "request_id";
pub const FIELD_SCAN_ID: &str = "scan_id";
pub const FIELD_ENTITY_ID: &str = "entity_id";

// `end_error` only
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";
pub const FIELD_RETRYABLE: &str = "retryable";
pub const FIELD_MESSAGE: &str = "message";

pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
