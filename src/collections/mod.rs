// ============================================================================
// spark-observe - Collections
// Observable arrays, maps and sets with index-map bookkeeping
// ============================================================================

pub mod array;
pub mod index_map;
pub mod map;
pub mod observer;
pub mod set;

pub use array::ObservableArray;
pub use index_map::{IndexMap, NEW_ITEM};
pub use map::ObservableMap;
pub use observer::{CollectionKind, CollectionLengthObserver, CollectionObserver};
pub use set::ObservableSet;
