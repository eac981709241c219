//! Reactive views over the cache store
//!
//! [`data::ReactiveData`] is the per-consumer stale-while-revalidate accessor;
//! [`operation::Operations`] wraps network calls and bumps collection
//! timestamps on success.

pub mod cell;
pub mod data;
pub mod operation;

pub use cell::StateCell;
pub use data::{DataState, FetchFn, FetchOptions, ReactiveData, fetcher};
pub use operation::{Hooks, OperationOptions, Operations};
