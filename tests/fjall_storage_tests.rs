mod common;

#[cfg(feature = "fjall")]
mod tests {
    use super::common::test_utils::{TestDb, generate_test_items, small_config};
    use bitsliced_bloom::{
        FjallRowStore, FjallRowStoreConfigBuilder, ProbabilisticIndex, RowStore,
    };
    use std::path::Path;

    fn open_store(path: &Path) -> FjallRowStore {
        let config = FjallRowStoreConfigBuilder::default()
            .db_path(path.to_path_buf())
            .build()
            .unwrap();
        FjallRowStore::open(config).expect("Unable to open fjall store")
    }

    #[test]
    fn test_row_operations() {
        let test_db = TestDb::new("fjall_row_operations", "fjall");
        let mut store = open_store(&test_db.path());

        assert!(store.get_row(3).unwrap().is_empty());
        store.set_rows(&[(3, vec![0x80]), (300, vec![0x01, 0x02])]).unwrap();
        assert_eq!(
            store.get_rows(&[300, 3, 4]).unwrap(),
            vec![vec![0x01, 0x02], vec![0x80], vec![]]
        );

        store.set_bits(&[3, 3, 4], 1, true).unwrap();
        assert_eq!(store.get_row(3).unwrap(), vec![0xc0]);
        assert_eq!(store.get_row(4).unwrap(), vec![0x40]);
    }

    #[test]
    fn test_scan_uses_numeric_row_order() {
        let test_db = TestDb::new("fjall_scan", "fjall");
        let mut store = open_store(&test_db.path());

        // 256 would sort before 3 with little endian keys
        for row in [256, 3, 70_000, 1] {
            store.set_row(row, &[1]).unwrap();
        }
        let rows: Vec<usize> = store
            .scan(0, 100_000)
            .unwrap()
            .into_iter()
            .map(|(row, _)| row)
            .collect();
        assert_eq!(rows, vec![1, 3, 256, 70_000]);
        assert_eq!(store.scan(4, 256).unwrap().len(), 0);
    }

    #[test]
    fn test_index_persists_across_reopen() {
        let test_db = TestDb::new("fjall_index_reopen", "fjall");
        let items = generate_test_items("reads", 40);

        {
            let store = open_store(&test_db.path());
            let mut index =
                ProbabilisticIndex::open(store, Some(small_config(4000, 4))).unwrap();
            index.register_colour("first").unwrap();
            let second = index.register_colour("second").unwrap();
            index.insert_elements(&items, second).unwrap();
            index.close().unwrap();
        }

        let store = open_store(&test_db.path());
        let mut index = ProbabilisticIndex::open(store, None).unwrap();
        assert_eq!(index.config().num_hashes, 4);
        assert_eq!(index.num_colours().unwrap(), 2);
        assert_eq!(index.colour_of("second"), Some(1));
        for item in &items {
            assert!(index.contains(item, 1).unwrap());
            assert!(!index.contains(item, 0).unwrap());
        }

        index.remove_colour(1).unwrap();
        assert!(index.lookup(&items[0]).unwrap().is_empty());
        index.close().unwrap();
    }
}
