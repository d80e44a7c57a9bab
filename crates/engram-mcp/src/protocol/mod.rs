//! JSON-RPC protocol layer: types and the stdio transport.

pub mod stdio;
pub mod types;
