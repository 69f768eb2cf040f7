//! Operation boundary macros
//!
//! Every command logs one `start` event and then exactly one `end` or
//! `end_error` event, all carrying `component`, `op` and `event`. Field names
//! match the keys in `kubetrail_core_types::schema`, which is what
//! [`TestCapture`](crate::logging_facility::TestCapture) reads them back by.
//!
//! Callers need `tracing` and `kubetrail-core-types` in their dependencies.

#[doc(hidden)]
#[macro_export]
macro_rules! __op_event {
    ($level:ident, $op:expr, $event:expr) => {
        tracing::$level!(
            component = module_path!(),
            op = $op,
            event = $event,
        );
    };
    ($level:ident, $op:expr, $event:expr, $($field:tt)+) => {
        tracing::$level!(
            component = module_path!(),
            op = $op,
            event = $event,
            $($field)+
        );
    };
}

/// Log the start of an operation
///
/// # Example
///
/// ```
/// # use kubetrail_core::log_op_start;
/// log_op_start!("ingest");
/// log_op_start!("ingest", document_count = 12);
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)+)?) => {
        $crate::__op_event!(
            info,
            $op,
            kubetrail_core_types::schema::EVENT_START
            $(, $($field)+)?
        )
    };
}

/// Log the successful end of an operation. `started` is the `Instant` taken
/// when the operation began; it becomes `duration_ms`.
///
/// # Example
///
/// ```
/// # use kubetrail_core::log_op_end;
/// let started = std::time::Instant::now();
/// log_op_end!("ingest", started = started, scan_id = 7_i64);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, started = $started:expr $(, $($field:tt)+)?) => {
        $crate::__op_event!(
            info,
            $op,
            kubetrail_core_types::schema::EVENT_END,
            duration_ms = $started.elapsed().as_millis() as u64
            $(, $($field)+)?
        )
    };
}

/// Log an operation error. Anything convertible into `ExError` is accepted;
/// its kind, code, retryability and the scan, entity and request it names
/// are attached as fields.
///
/// # Example
///
/// ```
/// # use kubetrail_core::log_op_error;
/// # use kubetrail_core::errors::{ExError, ExErrorKind};
/// let started = std::time::Instant::now();
/// let err = ExError::new(ExErrorKind::NotFound).with_scan_id(3);
/// log_op_error!("fetch_scan", err, started = started);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, started = $started:expr $(, $($field:tt)+)?) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        $crate::__op_event!(
            error,
            $op,
            kubetrail_core_types::schema::EVENT_END_ERROR,
            duration_ms = $started.elapsed().as_millis() as u64,
            err_kind = ?ex_err.kind(),
            err_code = ex_err.code(),
            retryable = ex_err.is_retryable(),
            scan_id = ex_err.scan_id(),
            entity_id = ex_err.entity_id(),
            request_id = ex_err.request_id().map(|r| r.as_str()),
            message = ex_err.message()
            $(, $($field)+)?
        )
    }};
}
