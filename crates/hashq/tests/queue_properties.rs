//! Property-based tests for queue ordering.

use hashq::{KdfParams, Ordering, QueueConfig, Store, StoreOptions, ValueQueue};
use proptest::prelude::*;

fn store() -> Store {
    let options = StoreOptions::builder()
        .with_kdf_params(KdfParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        })
        .build();
    Store::open(&options).unwrap()
}

fn payloads() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z0-9]{1,12}", 0..24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// FIFO pops in push order.
    #[test]
    fn fifo_preserves_push_order(items in payloads()) {
        let store = store();
        let queue = ValueQueue::new(&store, QueueConfig::fifo()).unwrap();
        for item in &items {
            queue.push(item).unwrap();
        }

        let mut popped = Vec::new();
        while let Some(item) = queue.pop().unwrap() {
            popped.push(item);
        }
        prop_assert_eq!(popped, items);
    }

    /// LIFO pops in reverse push order.
    #[test]
    fn lifo_reverses_push_order(items in payloads()) {
        let store = store();
        let config = QueueConfig::builder().ordering(Ordering::Lifo).build().unwrap();
        let queue = ValueQueue::new(&store, config).unwrap();
        for item in &items {
            queue.push(item).unwrap();
        }

        let mut popped = Vec::new();
        while let Some(item) = queue.pop().unwrap() {
            popped.push(item);
        }
        let mut expected = items;
        expected.reverse();
        prop_assert_eq!(popped, expected);
    }

    /// size == pushes - pops, and peek(i) agrees with pop order.
    #[test]
    fn size_and_peek_agree(items in payloads(), pops in 0usize..30) {
        let store = store();
        let queue = ValueQueue::new(&store, QueueConfig::fifo()).unwrap();
        for item in &items {
            queue.push(item).unwrap();
        }

        let popped = (0..pops).filter_map(|_| queue.pop().unwrap()).count();
        prop_assert_eq!(popped, pops.min(items.len()));
        prop_assert_eq!(queue.size().unwrap(), items.len() - popped);
        prop_assert_eq!(queue.is_empty().unwrap(), queue.size().unwrap() == 0);

        for (position, expected) in items[popped..].iter().enumerate() {
            let peeked = queue.peek(position).unwrap();
            prop_assert_eq!(peeked.as_ref(), Some(expected));
        }
        prop_assert_eq!(queue.peek(items.len() - popped).unwrap(), None);
    }

    /// remove(n) removes min(n, size).
    #[test]
    fn remove_is_bounded(items in payloads(), count in 1usize..30) {
        let store = store();
        let queue = ValueQueue::new(&store, QueueConfig::lifo()).unwrap();
        for item in &items {
            queue.push(item).unwrap();
        }

        prop_assert_eq!(queue.remove(count).unwrap(), count.min(items.len()));
        prop_assert_eq!(queue.size().unwrap(), items.len().saturating_sub(count));
    }
}
