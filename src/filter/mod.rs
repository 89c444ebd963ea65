//! Issuance filtering
//!
//! Filters are external executables that receive a batch of issuances and
//! return the subset (possibly transformed) that should be alerted on. The
//! monitor only depends on the narrow [`IssuanceFilter`] interface; the
//! process plumbing lives in [`plugin::PluginFilter`].
//!
//! - [`handshake`]: first-line protocol announcement
//! - [`rpc`]: JSON-RPC message types
//! - [`transport`]: child-process stdio transport
//! - [`plugin`]: client half, one process per invocation
//! - [`chain`]: ordered composition of filters
//! - [`server`]: plugin half, for building filter executables

use async_trait::async_trait;

use crate::certspotter::Issuance;
use crate::error::Result;

pub mod chain;
pub mod handshake;
pub mod plugin;
pub mod rpc;
pub mod server;
pub mod transport;

pub use chain::{ChainFailure, ChainResult, FilterChain};
pub use plugin::PluginFilter;

/// Environment variable a plugin must find set to [`MAGIC_COOKIE_VALUE`].
pub const MAGIC_COOKIE_KEY: &str = "CT_MONITOR_PLUGIN";

/// Expected value of [`MAGIC_COOKIE_KEY`].
pub const MAGIC_COOKIE_VALUE: &str = "issuance_filter";

/// Version of the handshake framing.
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Version of the `Plugin.Filter` contract.
pub const PROTOCOL_VERSION: u32 = 1;

/// RPC method name served by plugins.
pub const FILTER_METHOD: &str = "Plugin.Filter";

/// Decide which issuances of a batch should be alerted on.
#[async_trait]
pub trait IssuanceFilter: Send + Sync + std::fmt::Debug {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Return the issuances to keep.
    async fn filter(&self, issuances: Vec<Issuance>) -> Result<Vec<Issuance>>;
}
