//! Transport-tier fault injection via a Toxiproxy process.
//!
//! The application-tier interceptors lie to the in-process client
//! about what it received; this tier corrupts the bytes on the wire
//! instead, producing faults a real transport would surface (resets,
//! stalls). The two tiers are independent and composable.
//!
//! # Example
//!
//! ```rust,ignore
//! use rpc_chaos::chaos::{Toxiproxy, ToxicEndpoint};
//!
//! let client = Toxiproxy::localhost();
//! let route = ToxicEndpoint::install(&client, "backend", "localhost:5555", "localhost:8124").await?;
//!
//! // reset the TCP conversation under the system under test;
//! // the guard removes the toxic even if the test body panics
//! let toxic = route.reset_peer(100).await?;
//! // ... drive the system under test ...
//! toxic.remove().await?;
//!
//! route.disable().await?; // coarse on/off fault
//! client.reset().await?;
//! ```

mod toxiproxy;

pub use toxiproxy::{
    Direction, Proxy, Toxic, ToxicEndpoint, ToxicGuard, Toxiproxy, ToxiproxyError,
};
