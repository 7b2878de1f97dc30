//! References: nodes whose subtree is a live mirror of another node's.
//!
//! A reference resolves its query once, from itself, and then shows the
//! target's children through proxies. Proxies are ordinary arena entries
//! created on first access and cached per reference, keyed by the node they
//! stand in for. Anything that mutates structure goes to the real node and
//! the result is wrapped back into the mirror it was reached through.

mod behavior;
mod mirror;
mod state;
mod sync;

pub use behavior::ReferenceBehavior;
pub use state::{ProxyState, ReferencePolicy, ReferenceState, Transitions};
