//! Document-store adapter and its driver seam.

pub mod adapter;
pub mod blocking;
pub mod codec;
pub mod config;
pub mod context;
pub mod driver;
pub mod handles;
pub mod index;
pub mod matcher;
pub mod memory;

/// Document field holding the primary key.
pub const ID_FIELD: &str = "_id";

pub use adapter::{DocumentStoreAdapter, SearchHit};
pub use blocking::BlockingAdapter;
pub use codec::DocumentCodec;
pub use config::AdapterConfig;
pub use context::{CancellationSignal, OperationContext};
pub use driver::{
    DocumentCollection, DocumentDriver, FindOptions, IndexKind, IndexModel, StoreSession,
    UpdateSpec,
};
pub use handles::{CollectionHandleCache, HandleKey};
pub use index::derive_indexes;
pub use memory::{MemoryCollection, MemoryDriver, MemoryDriverConfig};
