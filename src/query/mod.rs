//! Backend-agnostic query model and its compilation to native store form.

pub mod evaluate;
pub mod filter;
pub mod page;
pub mod search;
pub mod sort;
pub mod translator;

pub use evaluate::evaluate;
pub use filter::{AttrRef, FilterLeaf, FilterNode, FilterOperator};
pub use page::Page;
pub use search::SearchQuery;
pub use sort::{SortDirection, SortKey, SortSpec};
pub use translator::{DocumentSort, QueryTranslator, SqlFilter};
