//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cors.rs (origin policy, preflight answers)
//!     → headers.rs (strip hop-by-hop, force no-cache on outbound)
//!     → Pass to relay
//!
//! Backend response:
//!     → headers.rs (copy headers, append every Set-Cookie)
//! ```
//!
//! # Design Decisions
//! - No trust in client framing headers: length and host are recomputed
//! - Cookies pass through untouched in both directions

pub mod cors;
pub mod headers;
