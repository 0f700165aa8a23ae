// ---------------------------------------------------------------------------
// Conditional tracing support
// ---------------------------------------------------------------------------

/// Enter a tracing span for a pipeline stage (when the `tracing` feature is
/// enabled). When disabled, this is a no-op and the compiler eliminates it.
///
/// The guard is held until the end of the enclosing block, so this must not be
/// used inside `async` code (an entered span is not `Send`).
macro_rules! trace_stage {
    ($label:expr, $stage:expr) => {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!(
            "accumulate_stage",
            label = $label.as_deref().unwrap_or("-"),
            stage = $stage.as_str()
        )
        .entered();
    };
}

/// Emit a tracing event at the given level (when the `tracing` feature is
/// enabled).
macro_rules! log_event {
    ($level:ident, $($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        tracing::$level!($($arg)+);
    };
}
