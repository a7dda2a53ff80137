//! SideGate - resilient multi-provider LLM completions
//!
//! Turns a set of rate-limited, unreliable inference providers into one
//! dependable completion call: round-robin key pools with cooldowns, model
//! fallback within a provider, provider failover gated by caller entitlement,
//! and an isolated (offline-only) mode.
//!
//! ```no_run
//! use sidegate::{CallContext, Gateway, Message, Purpose, Tier};
//!
//! # async fn run() -> sidegate::Result<()> {
//! let gateway = Gateway::from_env()?;
//! let result = gateway
//!     .complete(
//!         &CallContext::new(Tier::Pro),
//!         Purpose::FastScoring,
//!         vec![Message::user("Rate this commit message from 1 to 10")],
//!         None,
//!     )
//!     .await?;
//! println!("{} (via {}/{})", result.text, result.provider_used, result.model_used);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod billing;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod provider;
pub mod router;

pub use api::{CallResult, CompletionParams, Message, Purpose, Usage};
pub use billing::{BillingSink, LogBillingSink, UsageRecord};
pub use config::{ConfigLoader, GatewayConfig, ProviderConfig, ProviderKind, RoutingConfig, Tier};
pub use context::{Abort, CallContext, CancelHandle, CancelToken};
pub use error::{ClassifiedError, GatewayError, Result};
pub use gateway::{Gateway, GatewayBuilder};
pub use provider::{AttemptRequest, CloudProvider, Completion, LocalProvider, ProviderClient};
pub use router::{
    AllowAll, Credential, EntitlementGate, FailoverPolicy, KeyPool, PoolMetrics, ProviderTarget,
    Route, TierGate,
};
