//! Fault injection harness for async RPC clients.
//!
//! Two independent fault tiers let a test harness drive a system under
//! test through partial-failure conditions without a flaky network:
//!
//! - **Application tier** ([`interceptor`]): decorators around a call's
//!   request/response streams that deny operations with `Unavailable`,
//!   drop individual messages silently, or gate everything behind a
//!   shared kill switch. The system under test observes exactly the
//!   error shape a real outage would produce.
//! - **Transport tier** ([`chaos`], `chaos` feature): a Toxiproxy
//!   control client that corrupts the TCP conversation underneath the
//!   client - connection resets, stalls, route on/off.
//!
//! This crate never retries, persists fault configuration, or adds
//! resilience of its own; reacting to the injected faults is the
//! system under test's job.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rpc_chaos::{ControlledAvailability, testing::EchoChannel};
//!
//! let channel = EchoChannel::new();
//! let interceptor = ControlledAvailability::new();
//! let switch = interceptor.switch();
//!
//! switch.set(false);
//! let call = interceptor.unary(channel.unary(request));
//! assert!(call.response().await.is_err()); // Unavailable
//!
//! switch.set(true); // next call succeeds
//! ```

pub mod call;
pub mod interceptor;
pub mod policy;
pub mod status;
pub mod stream;
pub mod testing;

#[cfg(feature = "chaos")]
pub mod chaos;

pub use call::{
    CallShape, ClientStreamingCall, DuplexStreamingCall, Metadata, ServerStreamingCall, UnaryCall,
};
pub use interceptor::{ConditionalAvailability, ControlledAvailability, SkipStreamMessages};
pub use policy::{AvailabilitySwitch, FaultPolicy, Verdict};
pub use status::{Code, Status};
