//! Opt-in log output for test binaries.
//!
//! Add [`enable_tracing!`] to the crate under test and run it with `MEERAY_TRACE=1`
//! (or `MEERAY_TRACE=compact` for one line per event). `RUST_LOG` picks what is shown.

use ctor::ctor;
use tracing_subscriber::{
    EnvFilter,
    fmt::format,
};

pub const TRACE_VAR: &str = "MEERAY_TRACE";

#[ctor]
pub static TRACE: () = {
    let mode = std::env::var(TRACE_VAR).unwrap_or_default().to_lowercase();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer();
    let _ = match mode.as_str() {
        "1" | "true" | "on" => builder.try_init(),
        "compact" => builder.event_format(format().compact()).try_init(),
        _ => Ok(()),
    };
};

#[macro_export]
macro_rules! enable_tracing {
    () => {
        static _TRACE: &$crate::TRACE<()> = &$crate::TRACE;
    };
}
