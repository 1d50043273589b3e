//! Storage Module
//!
//! In-memory string store with per-key expiry.
//!
//! ## Features
//!
//! - **Lazy Expiry**: expired keys are removed when a read finds them
//! - **Scoped Ownership**: one store per session by default, or one shared
//!   store behind a mutex when [`StoreScope::Shared`] is configured
//!
//! ## Example
//!
//! ```
//! use emberkv::storage::{StoreFactory, StoreScope};
//! use bytes::Bytes;
//!
//! let factory = StoreFactory::new(StoreScope::PerConnection);
//! let mut first = factory.open();
//! let mut second = factory.open();
//!
//! first.set(Bytes::from("name"), Bytes::from("Ariz"), None);
//! assert_eq!(first.get(b"name"), Some(Bytes::from("Ariz")));
//! assert_eq!(second.get(b"name"), None);
//! ```

pub mod store;

pub use store::{KeyValueStore, SharedStore, StoreEntry, StoreFactory, StoreHandle, StoreScope};
