//! Symbol module - interned string identifiers.
//!
//! Identifiers, record labels, constructor names and exception tags all
//! flow through a single global interner. A [`Symbol`] is a 4-byte handle
//! into the table, so equality and hashing are O(1) regardless of the
//! spelled length, and every phase of the pipeline can pass names around
//! by value.
//!
//! The table is a process-wide [`DashMap`] keyed by the string itself,
//! with a second map for handle-to-string resolution. Interned strings
//! are leaked to obtain `'static` references; the table lives for the
//! whole session and interned names are never removed, so this costs
//! one allocation per distinct name.
//!
//! # Examples
//!
//! ```
//! use quill_util::symbol::Symbol;
//!
//! let a = Symbol::intern("emp");
//! let b = Symbol::intern("emp");
//! assert_eq!(a, b);
//! assert_eq!(a.as_str(), "emp");
//! ```

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::LazyLock;

/// Global string table instance
///
/// Initialized on first use via `LazyLock`. The well-known names below
/// are pre-interned so their indices are stable across a session.
static STRING_TABLE: LazyLock<StringTable> = LazyLock::new(|| {
    let table = StringTable::new();
    table.initialize_known_symbols();
    table
});

/// Number of symbol slots reserved for pre-interned names
const RESERVED_SYMBOLS_END: u32 = 32;

/// The implicit binding name for a bare expression statement (`it`)
pub const SYM_IT: Symbol = Symbol { index: 0 };
/// The `true` constant
pub const SYM_TRUE: Symbol = Symbol { index: 1 };
/// The `false` constant
pub const SYM_FALSE: Symbol = Symbol { index: 2 };
/// The empty-list constructor `nil`
pub const SYM_NIL: Symbol = Symbol { index: 3 };
/// The list cons constructor `::`
pub const SYM_CONS: Symbol = Symbol { index: 4 };
/// The option constructor `NONE`
pub const SYM_NONE: Symbol = Symbol { index: 5 };
/// The option constructor `SOME`
pub const SYM_SOME: Symbol = Symbol { index: 6 };
/// The `option` datatype name
pub const SYM_OPTION: Symbol = Symbol { index: 7 };

/// Thread-safe string table
///
/// Two maps: `by_name` resolves a string to its index on intern,
/// `by_index` resolves a handle back to its string. Both sides are
/// lock-free reads under DashMap.
struct StringTable {
    by_name: DashMap<&'static str, u32, ahash::RandomState>,
    by_index: DashMap<u32, &'static str, ahash::RandomState>,
    next_index: AtomicU32,
}

impl StringTable {
    fn new() -> Self {
        Self {
            by_name: DashMap::with_capacity_and_hasher(256, ahash::RandomState::new()),
            by_index: DashMap::with_capacity_and_hasher(256, ahash::RandomState::new()),
            next_index: AtomicU32::new(RESERVED_SYMBOLS_END),
        }
    }

    /// Pre-intern the well-known names, in the order of the constants above
    fn initialize_known_symbols(&self) {
        let known = ["it", "true", "false", "nil", "::", "NONE", "SOME", "option"];
        for (index, name) in known.iter().enumerate() {
            self.by_name.insert(name, index as u32);
            self.by_index.insert(index as u32, name);
        }
    }

    fn intern(&self, string: &str) -> u32 {
        if let Some(existing) = self.by_name.get(string) {
            return *existing;
        }
        // Leak to get a 'static str; the table owns it for the session.
        let leaked: &'static str = Box::leak(string.to_owned().into_boxed_str());
        match self.by_name.entry(leaked) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => *occupied.get(),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let index = self.next_index.fetch_add(1, Ordering::Relaxed);
                vacant.insert(index);
                self.by_index.insert(index, leaked);
                index
            }
        }
    }

    fn get(&self, index: u32) -> Option<&'static str> {
        self.by_index.get(&index).map(|entry| *entry)
    }

    fn count(&self) -> usize {
        self.by_index.len()
    }
}

/// An interned string identifier
///
/// `Symbol` is exactly 4 bytes, `Copy`, and compares by index. Interned
/// strings have `'static` lifetime and are never deallocated.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol {
    index: u32,
}

impl Symbol {
    /// Intern a string, returning its symbol
    #[inline]
    pub fn intern(string: &str) -> Self {
        Self {
            index: STRING_TABLE.intern(string),
        }
    }

    /// Resolve the symbol back to its string
    #[inline]
    pub fn as_str(&self) -> &'static str {
        STRING_TABLE.get(self.index).unwrap_or("")
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.as_str().len()
    }

    /// Compare against a `&str` without interning it
    #[inline]
    pub fn eq_str(&self, other: &str) -> bool {
        self.as_str() == other
    }

    /// Returns true if this is a pre-interned well-known symbol
    #[inline]
    pub fn is_known(&self) -> bool {
        self.index < RESERVED_SYMBOLS_END
    }

    #[inline]
    pub fn as_u32(&self) -> u32 {
        self.index
    }

    /// Number of distinct strings interned so far
    pub fn interned_count() -> usize {
        STRING_TABLE.count()
    }
}

impl std::fmt::Debug for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Symbol({})", self.as_str())
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Symbol {
    fn from(string: &str) -> Self {
        Symbol::intern(string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_symbol_intern() {
        let s1 = Symbol::intern("emp");
        let s2 = Symbol::intern("emp");
        let s3 = Symbol::intern("dept");

        assert_eq!(s1, s2);
        assert_ne!(s1, s3);
        assert_eq!(s1.as_str(), "emp");
        assert_eq!(s3.as_str(), "dept");
    }

    #[test]
    fn test_symbol_display() {
        let s = Symbol::intern("fact");
        assert_eq!(format!("{}", s), "fact");
        assert_eq!(format!("{:?}", s), "Symbol(fact)");
    }

    #[test]
    fn test_known_symbols() {
        assert_eq!(SYM_IT.as_str(), "it");
        assert_eq!(SYM_TRUE.as_str(), "true");
        assert_eq!(SYM_FALSE.as_str(), "false");
        assert_eq!(SYM_NIL.as_str(), "nil");
        assert_eq!(SYM_CONS.as_str(), "::");
        assert_eq!(SYM_NONE.as_str(), "NONE");
        assert_eq!(SYM_SOME.as_str(), "SOME");
        assert_eq!(SYM_OPTION.as_str(), "option");
    }

    #[test]
    fn test_known_symbols_are_stable() {
        assert_eq!(Symbol::intern("it"), SYM_IT);
        assert_eq!(Symbol::intern("::"), SYM_CONS);
        assert!(SYM_IT.is_known());
        assert!(!Symbol::intern("my_variable").is_known());
    }

    #[test]
    fn test_eq_str() {
        let sym = Symbol::intern("scott");
        assert!(sym.eq_str("scott"));
        assert!(!sym.eq_str("tiger"));
    }

    #[test]
    fn test_empty_string() {
        let s = Symbol::intern("");
        assert_eq!(s.as_str(), "");
        assert!(s.is_empty());
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn test_unicode_strings() {
        for test in ["naïve", "λ", "日本語"] {
            let sym = Symbol::intern(test);
            assert_eq!(sym.as_str(), test);
        }
    }

    #[test]
    fn test_idempotence() {
        for s in ["hello", "world", "from", "where"] {
            let sym1 = Symbol::intern(s);
            let sym2 = Symbol::intern(sym1.as_str());
            assert_eq!(sym1, sym2);
        }
    }

    #[test]
    fn test_concurrent_same_string() {
        let handles: Vec<_> = (0..10)
            .map(|_| thread::spawn(|| Symbol::intern("concurrent_same")))
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for symbol in &results[1..] {
            assert_eq!(results[0], *symbol);
        }
    }

    #[test]
    fn test_concurrent_distinct_strings() {
        let handles: Vec<_> = (0..10)
            .map(|i| thread::spawn(move || Symbol::intern(&format!("thread_{}", i))))
            .collect();
        let symbols: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for i in 0..symbols.len() {
            for j in (i + 1)..symbols.len() {
                assert_ne!(symbols[i], symbols[j]);
            }
        }
    }

    #[test]
    fn test_ordering_is_by_index_not_spelling() {
        // Ord exists so symbols can key BTreeMaps; it is interning order,
        // not lexicographic order.
        let a = Symbol::intern("zzz_order_probe");
        let b = Symbol::intern("aaa_order_probe");
        assert!(a < b);
    }
}
