//! Property-based test generators using proptest.

use proptest::prelude::*;

/// Strategy for keys: arbitrary bytes, including embedded zeros.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..48)
}

/// Strategy for keys drawn from a small space, so operations collide.
pub fn colliding_key_strategy() -> impl Strategy<Value = Vec<u8>> {
    (0u16..64).prop_map(|n| format!("key-{n}").into_bytes())
}

/// Strategy for values.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// A single operation against a key/value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Insert or overwrite `key`.
    Store {
        /// Key to write.
        key: Vec<u8>,
        /// Value to write.
        value: Vec<u8>,
    },
    /// Remove `key` if present.
    Delete {
        /// Key to remove.
        key: Vec<u8>,
    },
    /// Look up `key`.
    Fetch {
        /// Key to read.
        key: Vec<u8>,
    },
}

/// Strategy for one operation over colliding keys.
pub fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (colliding_key_strategy(), value_strategy())
            .prop_map(|(key, value)| Op::Store { key, value }),
        1 => colliding_key_strategy().prop_map(|key| Op::Delete { key }),
        2 => colliding_key_strategy().prop_map(|key| Op::Fetch { key }),
    ]
}

/// Strategy for a sequence of operations.
pub fn op_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 1..max_len)
}
