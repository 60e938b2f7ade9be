//! Wire types for the tabwire object-RPC protocol.
//!
//! This crate contains the serde-serializable types crossing the bridge
//! between a driver and the in-browser session manager: the envelope shapes
//! (calls, returns, lifecycle and domain events) and the domain data their
//! params carry. These types represent the "protocol layer" - the shapes of
//! data as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization/deserialization and
//!   small shape helpers
//! - **1:1 with the wire**: Field names are the wire names (camelCase)
//! - **Transport-agnostic**: The same shapes travel over an in-process pipe
//!   or a socket
//!
//! Dispatch machinery lives in `tabwire-runtime`; session semantics live in
//! `tabwire`.

pub mod envelope;
pub mod types;

pub use envelope::*;
pub use types::*;
