#![deny(unused_must_use)]

mod event_stream;
mod helpers;
mod tracking;

meeray_trace::enable_tracing!();
