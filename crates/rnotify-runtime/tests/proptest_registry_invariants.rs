//! Property-based invariant tests for the registry.
//!
//! 1. Keyless creation always yields distinct keys.
//! 2. A second creation under an explicit key always fails.
//! 3. Reference counts and the pending-dispose flag follow a simple set
//!    model under arbitrary add/remove sequences.
//! 4. Listeners fire once per actual change, never on equal writes.
//! 5. Related propagation notifies each parent once per child update.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

use proptest::prelude::*;
use rnotify_core::{Key, NotifierError};
use rnotify_runtime::{Options, Registry};

// ── Helpers ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum RefOp {
    Add(u64),
    Remove(u64),
}

fn arb_ref_op() -> impl Strategy<Value = RefOp> {
    prop_oneof![(0u64..5).prop_map(RefOp::Add), (0u64..5).prop_map(RefOp::Remove)]
}

// ═════════════════════════════════════════════════════════════════════════
// 1–2. Key uniqueness
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn keyless_creation_yields_distinct_keys(n in 1usize..40) {
        let registry = Registry::new();
        let keys: BTreeSet<String> = (0..n)
            .map(|_| registry.create_notifier(Options::new(), || 0u8).unwrap().key().to_string())
            .collect();
        prop_assert_eq!(keys.len(), n);
        prop_assert_eq!(registry.count(), n);
    }

    #[test]
    fn explicit_key_is_created_once(name in "[a-z]{1,12}") {
        let registry = Registry::new();
        registry.create_notifier(Options::new().with_key(name.as_str()), || 0u8).unwrap();
        let second = registry.create_notifier(Options::new().with_key(name.as_str()), || 1u8);
        let is_duplicate = matches!(second, Err(NotifierError::DuplicateKey { .. }));
        prop_assert!(is_duplicate);
        let kept = registry.get_notifier::<u8>(&Key::named(&name)).unwrap();
        prop_assert_eq!(kept.value(), 0);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Reference counting
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn reference_counts_follow_set_model(ops in proptest::collection::vec(arb_ref_op(), 0..80)) {
        let registry = Registry::new();
        let n = registry
            .create_notifier(Options::new().with_auto_dispose(true), || 0u8)
            .unwrap();
        let key = n.key().clone();

        let mut held = BTreeSet::new();
        let mut pending = false;
        for op in ops {
            match op {
                RefOp::Add(id) => {
                    let grew = registry.add_reference(&key, id);
                    prop_assert_eq!(grew, held.insert(id));
                    pending = false;
                }
                RefOp::Remove(id) => {
                    let shrank = registry.remove_reference(&key, id);
                    prop_assert_eq!(shrank, held.remove(&id));
                    if held.is_empty() {
                        pending = true;
                    }
                }
            }
            prop_assert_eq!(registry.reference_count(&key), held.len());
            prop_assert_eq!(registry.has_pending_dispose(&key), pending);
        }
        prop_assert!(registry.is_active(&key));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4–5. Notification counts
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn listeners_fire_once_per_change(values in proptest::collection::vec(0i32..3, 0..60)) {
        let registry = Registry::new();
        let child = registry.create_notifier(Options::new(), || 0i32).unwrap();
        let parent = registry
            .create_notifier(Options::new().with_related(&child), || 0i32)
            .unwrap();

        let own = Rc::new(Cell::new(0usize));
        let up = Rc::new(Cell::new(0usize));
        let o = Rc::clone(&own);
        child.listen(move |_| o.set(o.get() + 1));
        let u = Rc::clone(&up);
        parent.listen(move |_| u.set(u.get() + 1));

        let mut current = 0;
        let mut changes = 0usize;
        for value in values {
            child.update_state(value);
            if value != current {
                changes += 1;
                current = value;
            }
        }
        prop_assert_eq!(own.get(), changes);
        prop_assert_eq!(up.get(), changes);
        prop_assert_eq!(child.value(), current);
        prop_assert_eq!(parent.value(), 0);
    }
}
