//! The crate `meeray-types` contains the types shared by the transaction tracker, its
//! transport adapters and the command line tools.

#![deny(clippy::arithmetic_side_effects)]
#![deny(clippy::cast_possible_truncation)]
#![deny(unused_crate_dependencies)]
#![deny(missing_docs)]
#![deny(warnings)]

pub mod services;

#[doc(no_inline)]
pub use serde_json::Value as Payload;
