//! Process-wide string interning.
//!
//! `intern` returns the same refcounted allocation for equal content,
//! so pointer equality implies content equality. The map holds weak
//! references only; a string is dropped once the last handle goes
//! away, and dead entries are pruned opportunistically.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};

fn store() -> &'static Mutex<HashMap<Box<str>, Weak<str>>> {
    static STORE: OnceLock<Mutex<HashMap<Box<str>, Weak<str>>>> = OnceLock::new();
    STORE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns the shared handle for `s`, creating it on first use.
pub fn intern(s: &str) -> Arc<str> {
    let mut map = store().lock().expect("interner poisoned");
    if let Some(weak) = map.get(s) {
        if let Some(existing) = weak.upgrade() {
            return existing;
        }
    }
    let shared: Arc<str> = Arc::from(s);
    map.insert(Box::from(s), Arc::downgrade(&shared));
    // drop entries whose last strong handle is gone
    map.retain(|_, weak| weak.strong_count() > 0);
    shared
}

/// Number of live interned strings (diagnostics).
pub fn live_count() -> usize {
    store()
        .lock()
        .expect("interner poisoned")
        .values()
        .filter(|weak| weak.strong_count() > 0)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_content_shares_one_allocation() {
        let a = intern("relay-intern-test-a");
        let b = intern("relay-intern-test-a");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(&*a, "relay-intern-test-a");
    }

    #[test]
    fn different_content_gets_different_allocations() {
        let a = intern("relay-intern-test-x");
        let b = intern("relay-intern-test-y");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn dropping_all_handles_releases_the_entry() {
        let a = intern("relay-intern-test-drop");
        let weak = Arc::downgrade(&a);
        drop(a);
        assert!(weak.upgrade().is_none());
        // a new intern re-creates the entry
        let b = intern("relay-intern-test-drop");
        assert_eq!(&*b, "relay-intern-test-drop");
    }
}
