//! Stratus State Management
//!
//! Records which remote instance each declared resource was provisioned as,
//! together with the catalog ids its names resolved to. State lives in a local
//! JSON file guarded by a lock file so two runs cannot write it at once.
//!
//! # Example
//!
//! ```ignore
//! use stratus_state::{create_backend, BackendConfig};
//!
//! let backend = create_backend(&BackendConfig::local("stratus.state.json"))?;
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//! state.upsert_resource(record);
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::{LocalBackend, create_backend};
pub use lock::LockInfo;
pub use state::{ReferenceRecord, ResourceState, StateFile};
