//! Shared CLI argument types
//!
//! Reusable argument structs that can be flattened into commands using
//! `#[command(flatten)]`.

mod global;
mod list;

pub use global::GlobalOptions;
pub use list::ListArgs;
