//! Host/guest bridge.
//!
//! This module installs the `Awery` capability surface into a provider's
//! engine and converts values across the boundary. Everything here runs on
//! the provider's queue thread.

mod context;
mod convert;
mod ops;
mod types;

pub(crate) use context::{BridgeContext, GuestCallback, HttpBridge};
pub(crate) use convert::to_js;
pub(crate) use ops::{callback_object, install, rejection_error, settle_functions};
pub use types::{FetchMethod, FetchRequest, FetchResponse};
