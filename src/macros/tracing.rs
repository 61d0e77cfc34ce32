// Macros to emit events and spans when the `tracing` feature is enabled.
// Events take a plain format string. Without the feature the arguments are
// only type-checked, never formatted.

macro_rules! __trace_internal {
    ($trace_type:ident; $($element:tt)*) => {{
        #[cfg(feature = "tracing")]
        {
            ::tracing::$trace_type!($($element)*);
        }
        #[cfg(not(feature = "tracing"))]
        {
            _ = ::std::format_args!($($element)*);
        }
    }};
}

macro_rules! __trace {
    ($($element:tt)*) => {{
        __trace_internal!(trace; $($element)*)
    }};
}

macro_rules! __trace_debug {
    ($($element:tt)*) => {{
        __trace_internal!(debug; $($element)*)
    }};
}

macro_rules! __trace_warn {
    ($($element:tt)*) => {{
        __trace_internal!(warn; $($element)*)
    }};
}

macro_rules! __trace_error {
    ($($element:tt)*) => {{
        __trace_internal!(error; $($element)*)
    }};
}

// Enters a `TRACE` span for the rest of the enclosing block.
macro_rules! __span_trace {
    ($($element:tt)*) => {
        #[cfg(feature = "tracing")]
        let _span = ::tracing::trace_span!($($element)*);
        #[cfg(feature = "tracing")]
        let _enter = _span.enter();
    };
}
