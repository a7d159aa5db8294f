pub mod error;
pub mod types;
pub mod value;

pub use error::{MapperError, Result, StoreError, StoreResult};
pub use types::{DeclaredType, EncodingKind};
pub use value::Document;
