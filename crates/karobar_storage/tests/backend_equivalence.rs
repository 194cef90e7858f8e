//! The file and in-memory logs must behave identically.

use karobar_storage::{FileBackend, InMemoryBackend, StorageBackend};
use proptest::prelude::*;
use tempfile::tempdir;

#[derive(Debug, Clone)]
enum Op {
    Append(Vec<u8>),
    TruncateBack(u64),
    Replace(Vec<u8>),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => prop::collection::vec(any::<u8>(), 0..64).prop_map(Op::Append),
        1 => (0u64..32).prop_map(Op::TruncateBack),
        1 => prop::collection::vec(any::<u8>(), 0..64).prop_map(Op::Replace),
    ]
}

fn apply(backend: &mut dyn StorageBackend, op: &Op) {
    match op {
        Op::Append(data) => {
            backend.append(data).unwrap();
        }
        Op::TruncateBack(n) => {
            let size = backend.size().unwrap();
            backend.truncate(size.saturating_sub(*n)).unwrap();
        }
        Op::Replace(data) => backend.replace(data).unwrap(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn file_matches_memory(ops in prop::collection::vec(op_strategy(), 1..24)) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.wal");
        let mut file = FileBackend::open(&path).unwrap();
        let mut memory = InMemoryBackend::new();

        for op in &ops {
            apply(&mut file, op);
            apply(&mut memory, op);
        }
        file.sync().unwrap();

        let size = memory.size().unwrap();
        prop_assert_eq!(file.size().unwrap(), size);
        prop_assert_eq!(file.read_at(0, size as usize).unwrap(), memory.data());

        drop(file);
        let reopened = FileBackend::open(&path).unwrap();
        prop_assert_eq!(reopened.read_at(0, size as usize).unwrap(), memory.data());
    }
}
