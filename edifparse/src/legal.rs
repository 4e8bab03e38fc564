//! Name legalization.
//!
//! EDIF identifiers are restricted to a small character set.
//! Everything else is written as `(rename legal "original")`,
//! so readers need the rename of each object and writers need a
//! deterministic, collision-free legal form for each name.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use compact_str::CompactString;
use dashmap::DashMap;
use crate::Ident;

#[inline]
fn is_illegal_char(c: char) -> bool {
    matches!(c,
             '[' | ']' | '<' | '>' | '.' | '/' | '\\' | '(' | ')' |
             '{' | '}' | '?' | ';' | '\'' | '`' | ':' | '"' | '!' |
             '|' | '~' | '*' | '^' | '=' | '-' | '+' | ',' | '%' |
             '#' | '@' | '$' | '&' | ' ') || !c.is_ascii()
}

/// Length of `name` in bytes without a trailing `[l:r]` bus
/// suffix. With `keep_open_bracket` the `[` is counted.
///
/// Returns the full length if there is no such suffix.
pub fn length_of_name_without_bus(name: &str, keep_open_bracket: bool) -> usize {
    let b = name.as_bytes();
    let len = b.len();
    if len == 0 || b[len - 1] != b']' {
        return len
    }
    let mut i = len - 1;
    while i > 0 && b[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i == 0 || b[i - 1] != b':' {
        return len
    }
    i -= 1;
    while i > 0 && b[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i == 0 || b[i - 1] != b'[' {
        return len
    }
    i - 1 + keep_open_bracket as usize
}

/// Strips a trailing `[l:r]` range: `data[7:0]` gives `data`,
/// or `data[` with `keep_open_bracket`.
pub fn bus_name(name: &str, keep_open_bracket: bool) -> &str {
    &name[..length_of_name_without_bus(name, keep_open_bracket)]
}

/// Strips a bit index: `data[3]` gives `data[`. Names without a
/// bracket are returned unchanged.
pub fn root_bus_name(name: &str, include_open_bracket: bool) -> &str {
    match name.rfind('[') {
        Some(p) => &name[..p + include_open_bracket as usize],
        None => name
    }
}

/// `(left, right)` of a trailing `[l:r]` range.
pub fn parse_bus_range(name: &str) -> Option<(u32, u32)> {
    let len = length_of_name_without_bus(name, true);
    if len == name.len() {
        return None
    }
    let (l, r) = name[len..name.len() - 1].split_once(':')?;
    Some((l.parse().ok()?, r.parse().ok()?))
}

/// Bit index of a single-bit name like `data[5]`.
pub fn index_from_name(name: &str) -> Option<i32> {
    let open = name.rfind('[')?;
    name.strip_suffix(']')?.get(open + 1..)?.parse().ok()
}

/// Maps an arbitrary name to a legal EDIF identifier.
///
/// A trailing bus range is dropped, illegal characters become
/// `_`, and a name starting with `_` or a digit gets an `&`
/// prefix. A leading `&` is the escape prefix itself and is kept,
/// which makes the mapping idempotent.
pub fn make_edif_compatible(name: &str) -> CompactString {
    let len = length_of_name_without_bus(name, false);
    let mut ret = CompactString::with_capacity(len + 1);
    for (i, c) in name[..len].char_indices() {
        if i == 0 && c == '&' {
            ret.push(c);
        }
        else if is_illegal_char(c) {
            ret.push('_');
        }
        else {
            ret.push(c);
        }
    }
    match ret.as_bytes().first() {
        Some(c) if *c == b'_' || c.is_ascii_digit() => {
            let mut prefixed = CompactString::with_capacity(ret.len() + 1);
            prefixed.push('&');
            prefixed.push_str(&ret);
            prefixed
        }
        _ => ret
    }
}

/// Lookup of source-text renames by object handle.
pub trait LegalNameLookup<K> {
    /// The rename seen for `key`, if any.
    fn rename_of(&self, key: &K) -> Option<Ident>;

    /// The rename if present, else `name`.
    fn legal_name(&self, key: &K, name: &Ident) -> Ident {
        self.rename_of(key).unwrap_or_else(|| name.clone())
    }
}

/// Single-threaded read-side rename cache.
#[derive(Debug, Clone)]
pub struct ReadLegalNameCache<K: Hash + Eq> {
    map: HashMap<K, Ident>,
}

impl<K: Hash + Eq> Default for ReadLegalNameCache<K> {
    fn default() -> Self {
        ReadLegalNameCache { map: HashMap::new() }
    }
}

impl<K: Hash + Eq> ReadLegalNameCache<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rename(&mut self, key: K, rename: Ident) {
        self.map.insert(key, rename);
    }

    pub fn remove(&mut self, key: &K) -> Option<Ident> {
        self.map.remove(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &Ident)> {
        self.map.iter()
    }
}

impl<K: Hash + Eq> LegalNameLookup<K> for ReadLegalNameCache<K> {
    fn rename_of(&self, key: &K) -> Option<Ident> {
        self.map.get(key).cloned()
    }
}

/// Read-side rename cache that parallel workers can fill
/// through a shared reference.
#[derive(Debug)]
pub struct ConcurrentReadLegalNameCache<K: Hash + Eq> {
    map: DashMap<K, Ident>,
}

impl<K: Hash + Eq> Default for ConcurrentReadLegalNameCache<K> {
    fn default() -> Self {
        ConcurrentReadLegalNameCache { map: DashMap::new() }
    }
}

impl<K: Hash + Eq + Clone> ConcurrentReadLegalNameCache<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rename(&self, key: K, rename: Ident) {
        self.map.insert(key, rename);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Converts into the single-threaded cache once the parallel
    /// phase is over.
    pub fn into_plain(self) -> ReadLegalNameCache<K> {
        ReadLegalNameCache { map: self.map.into_iter().collect() }
    }
}

impl<K: Hash + Eq + Clone> LegalNameLookup<K> for ConcurrentReadLegalNameCache<K> {
    fn rename_of(&self, key: &K) -> Option<Ident> {
        self.map.get(key).map(|r| r.value().clone())
    }
}

/// Write-side cache computing unique legal renames.
///
/// Each distinct source name is legalized once. Legal forms
/// that coincide case-insensitively get `_HDI_<n>` suffixes in
/// the order they are first requested. Safe to share between
/// writer threads.
#[derive(Debug)]
pub struct WriteLegalNameCache {
    /// source name to rename (`None` = already legal), by first byte.
    buckets: Box<[Mutex<HashMap<CompactString, Option<CompactString>>>]>,
    /// lowercase legal name to number of source names mapped to it.
    used: DashMap<CompactString, u32>,
    bus_collisions: DashMap<CompactString, CompactString>,
}

impl Default for WriteLegalNameCache {
    fn default() -> Self {
        WriteLegalNameCache {
            buckets: (0..256).map(|_| Mutex::new(HashMap::new())).collect(),
            used: DashMap::new(),
            bus_collisions: DashMap::new(),
        }
    }
}

impl WriteLegalNameCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn calc_rename(&self, name: &str) -> Option<CompactString> {
        let rename = make_edif_compatible(name);
        if rename == name {
            return None
        }
        let key = CompactString::from(rename.to_ascii_lowercase());
        let previous = {
            let mut cnt = self.used.entry(key).or_insert(0);
            let previous = *cnt;
            *cnt += 1;
            previous
        };
        match previous {
            0 => Some(rename),
            n => Some(compact_str::format_compact!("{}_HDI_{}", rename, n - 1))
        }
    }

    /// The legal rename of `name`, or `None` if `name` is already
    /// legal and can be written as-is.
    pub fn get_rename(&self, name: &str) -> Option<CompactString> {
        let first = name.as_bytes().first().copied().unwrap_or(0) as usize;
        let mut bucket = self.buckets[first]
            .lock().unwrap_or_else(|e| e.into_inner());
        if let Some(r) = bucket.get(name) {
            return r.clone()
        }
        let r = self.calc_rename(name);
        bucket.insert(name.into(), r.clone());
        r
    }

    /// The name to write for `name`: its rename if one is needed.
    pub fn legal_name(&self, name: &str) -> CompactString {
        self.get_rename(name).unwrap_or_else(|| name.into())
    }

    /// Rename used for a bus whose bare name collides with a
    /// scalar port of the same cell.
    pub fn bus_collision_rename(&self, name: &str) -> CompactString {
        self.bus_collisions.entry(name.into())
            .or_insert_with(|| {
                let mut r = make_edif_compatible(name);
                r.push_str("_BUS_");
                r
            })
            .value().clone()
    }
}
