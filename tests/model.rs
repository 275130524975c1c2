use std::collections::BTreeSet;

use mmap_bitset::{Bitset, Options};
use proptest::prelude::*;
use tempfile::tempdir;

#[derive(Clone, Debug)]
enum Op {
    Set(Vec<u64>),
    Unset(Vec<u64>),
    Get(Vec<u64>),
    Reopen,
}

fn indices() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(prop_oneof![0..64u64, 0..100_000u64], 0..8)
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => indices().prop_map(Op::Set),
        2 => indices().prop_map(Op::Unset),
        3 => indices().prop_map(Op::Get),
        1 => Just(Op::Reopen),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_matches_model(size in 0..1000u64, ops in prop::collection::vec(op(), 1..40)) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bitset");
        let mut bitset = Bitset::open(&path, Options::new().size(size)).unwrap();
        let mut model = BTreeSet::new();

        for op in ops {
            let before = bitset.capacity();
            match op {
                Op::Set(indices) => {
                    bitset.set(&indices).unwrap();
                    model.extend(indices);
                }
                Op::Unset(indices) => {
                    bitset.unset(&indices).unwrap();
                    for i in indices {
                        model.remove(&i);
                    }
                }
                Op::Get(indices) => {
                    let expected: Vec<u8> = indices.iter().map(|i| model.contains(i) as u8).collect();
                    prop_assert_eq!(bitset.get(&indices).unwrap(), expected);
                }
                Op::Reopen => {
                    bitset.close().unwrap();
                    bitset = Bitset::open(&path, Options::default()).unwrap();
                }
            }
            prop_assert!(bitset.capacity() >= before);
            prop_assert!(bitset.capacity().is_power_of_two());
        }

        let all: Vec<u64> = model.iter().copied().collect();
        prop_assert!(bitset.get(&all).unwrap().iter().all(|&b| b == 1));
    }
}
