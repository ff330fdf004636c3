//! Derive macro for gridwire network messages.
//!
//! # Example
//!
//! ```ignore
//! use gridwire_derive::Message;
//!
//! #[derive(Debug, Default, Message)]
//! #[message(direct_type = 10)]
//! struct Heartbeat {
//!     node: uuid::Uuid,
//!     sequence: i64,
//!     #[message(nested)]
//!     topology: Option<TopologyUpdate>,
//! }
//! ```

extern crate proc_macro;

mod message;

use proc_macro::TokenStream;

/// Derives `gridwire_core::protocol::Message` for a struct.
///
/// Fields are written and read in declaration order; the position of a field
/// among the non-skipped fields is its index.
///
/// # Attributes
///
/// ## Struct-level
/// - `#[message(direct_type = N)]`: **required**. The wire type byte, any
///   value except `0xFF`.
///
/// ## Field-level
/// - `#[message(skip)]`: neither written nor read; keeps its default.
/// - `#[message(nested)]`: the field holds nested messages. Supported shapes
///   are `Option<M>`, `Vec<M>` and `HashMap<K, M>`.
/// - `#[message(object)]`: the field is marshalled with the object codec
///   and framed as a length-prefixed blob.
///
/// Any other field must implement `MessageField`.
#[proc_macro_derive(Message, attributes(message))]
pub fn derive_message(input: TokenStream) -> TokenStream {
    message::derive_message_impl(input)
}
