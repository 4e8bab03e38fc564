//! Thread-safe string uniquifier.

use std::sync::Arc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// An interned identifier. Equal names coming from the same
/// [`StringPool`] share one allocation.
pub type Ident = Arc<str>;

/// Insert-or-get string pool shared by all parse workers.
///
/// It always hands back the first instance stored for a given
/// content, no matter which thread asks.
#[derive(Debug, Default)]
pub struct StringPool {
    map: DashMap<Ident, ()>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(c: usize) -> Self {
        StringPool { map: DashMap::with_capacity(c) }
    }

    /// Returns the canonical instance for `s`.
    pub fn intern(&self, s: &str) -> Ident {
        if let Some(r) = self.map.get(s) {
            return r.key().clone()
        }
        let fresh: Ident = Arc::from(s);
        match self.map.entry(fresh.clone()) {
            Entry::Occupied(e) => e.key().clone(),
            Entry::Vacant(e) => {
                e.insert(());
                fresh
            }
        }
    }

    /// Canonicalizes an already-allocated identifier.
    pub fn intern_arc(&self, s: Ident) -> Ident {
        match self.map.entry(s.clone()) {
            Entry::Occupied(e) => e.key().clone(),
            Entry::Vacant(e) => {
                e.insert(());
                s
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[test]
fn test_pool_canonical_across_threads() {
    let pool = Arc::new(StringPool::new());
    let handles: Vec<_> = (0..4).map(|_| {
        let pool = pool.clone();
        std::thread::spawn(move || pool.intern("LUT6_2_inst_with_long_name"))
    }).collect();
    let got: Vec<Ident> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for g in &got {
        assert!(Arc::ptr_eq(g, &got[0]));
    }
    assert_eq!(pool.len(), 1);
}
