//! Deduplication pools
//!
//! Every resource kind is interned into a pool: the first occurrence of a
//! value gets the next sequential index, later occurrences of an equal
//! value get the same index back. Lookup is hash based and the final list
//! is the insertion order, which other tables reference by index.

use std::fmt;
use std::hash::Hash;

use indexmap::IndexSet;
use lasso::{Key, Rodeo};

/// Resource kinds that are pooled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Color,
    String,
    Vertex,
    TexCoord,
    Skin,
    Other,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolKind::Color => "color",
            PoolKind::String => "string",
            PoolKind::Vertex => "vertex",
            PoolKind::TexCoord => "texcoord",
            PoolKind::Skin => "skin",
            PoolKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Insertion-ordered set handing out sequential indices
#[derive(Debug, Clone)]
pub struct Pool<T> {
    kind: PoolKind,
    entries: IndexSet<T>,
}

impl<T: Hash + Eq> Pool<T> {
    pub fn new(kind: PoolKind) -> Self {
        Self {
            kind,
            entries: IndexSet::new(),
        }
    }

    /// Index of `value`, adding it if this is its first occurrence
    pub fn intern(&mut self, value: T) -> u32 {
        let (index, _) = self.entries.insert_full(value);
        index as u32
    }

    /// Index of `value` if it has been interned
    pub fn find(&self, value: &T) -> Option<u32> {
        self.entries.get_index_of(value).map(|i| i as u32)
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.entries.get_index(index as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Freeze into emission order
    pub fn into_vec(self) -> Vec<T> {
        self.entries.into_iter().collect()
    }
}

/// String pool, interned by exact value
#[derive(Debug, Default)]
pub struct StringPool {
    rodeo: Rodeo,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> u32 {
        self.rodeo.get_or_intern(s).into_usize() as u32
    }

    pub fn find(&self, s: &str) -> Option<u32> {
        self.rodeo.get(s).map(|key| key.into_usize() as u32)
    }

    pub fn contains(&self, s: &str) -> bool {
        self.rodeo.contains(s)
    }

    pub fn len(&self) -> usize {
        self.rodeo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rodeo.is_empty()
    }

    /// Freeze into emission order
    pub fn into_vec(self) -> Vec<String> {
        self.rodeo.strings().map(str::to_owned).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_occurrence_order() {
        let mut pool = Pool::new(PoolKind::Other);
        assert_eq!(pool.intern("b"), 0);
        assert_eq!(pool.intern("a"), 1);
        assert_eq!(pool.intern("b"), 0);
        assert_eq!(pool.intern("c"), 2);
        assert_eq!(pool.into_vec(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_string_pool_order_and_lookup() {
        let mut strings = StringPool::new();
        assert_eq!(strings.intern("Material"), 0);
        assert_eq!(strings.intern("Bone.001"), 1);
        assert_eq!(strings.intern("Material"), 0);
        assert_eq!(strings.find("Bone.001"), Some(1));
        assert!(!strings.contains("missing"));
        assert_eq!(strings.into_vec(), vec!["Material".to_string(), "Bone.001".to_string()]);
    }

    proptest! {
        #[test]
        fn interning_is_idempotent(values in proptest::collection::vec(0u16..64, 0..200)) {
            let mut pool = Pool::new(PoolKind::Other);
            for value in &values {
                let before = pool.len();
                let first = pool.intern(*value);
                let again = pool.intern(*value);
                prop_assert_eq!(first, again);
                prop_assert!(pool.len() <= before + 1);
            }
            let mut distinct = values.clone();
            distinct.sort_unstable();
            distinct.dedup();
            prop_assert_eq!(pool.len(), distinct.len());
        }

        #[test]
        fn string_interning_is_idempotent(values in proptest::collection::vec("[a-d]{0,3}", 0..100)) {
            let mut strings = StringPool::new();
            for value in &values {
                let index = strings.intern(value);
                prop_assert_eq!(strings.intern(value), index);
            }
        }
    }
}
