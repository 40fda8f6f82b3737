//! Model generation providers.

#[cfg(feature = "tripo")]
mod tripo;

#[cfg(feature = "tripo")]
pub use tripo::{TripoProvider, TripoProviderBuilder};
