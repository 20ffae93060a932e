//! Internal implementation details.

pub(crate) mod fault;

pub(crate) use fault::catch_fault;

#[cfg(feature = "ahash")]
pub(crate) type FastMap<K, V> = ahash::AHashMap<K, V>;
#[cfg(not(feature = "ahash"))]
pub(crate) type FastMap<K, V> = std::collections::HashMap<K, V>;

#[cfg(feature = "ahash")]
pub(crate) type FastSet<T> = ahash::AHashSet<T>;
#[cfg(not(feature = "ahash"))]
pub(crate) type FastSet<T> = std::collections::HashSet<T>;
