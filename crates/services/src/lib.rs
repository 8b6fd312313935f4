//! Lifecycle management for long-running async services.

#![deny(unused_crate_dependencies)]
#![deny(warnings)]

mod service;
mod state;

pub mod stream {
    #[doc(no_inline)]
    pub use futures::stream::Stream;
    pub type BoxStream<T> =
        core::pin::Pin<Box<dyn Stream<Item = T> + Send + Sync + 'static>>;
}

pub use service::{
    RunnableService,
    RunnableTask,
    Service,
    ServiceRunner,
    TaskNextAction,
    panic_to_string,
};
pub use state::{
    State,
    StateWatcher,
};
