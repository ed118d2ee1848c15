mod common;

use bitsliced_bloom::{
    HashKind, InMemoryIndex, InMemoryRowStore, IndexError, MatrixConfigBuilder,
    ProbabilisticIndex, parse_colour,
};
use common::test_utils::{FixedHasher, generate_test_items, small_config};
use std::sync::Arc;

fn create_test_index(size: usize, num_hashes: usize) -> InMemoryIndex {
    InMemoryIndex::in_memory(small_config(size, num_hashes))
        .expect("Failed to create test index")
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[test]
    fn test_operations_fail_after_close() {
        let mut index = create_test_index(100, 3);
        index.add(b"ACGT", 0).unwrap();
        assert!(index.is_open());

        index.close().unwrap();
        assert!(!index.is_open());

        assert!(matches!(index.lookup(b"ACGT"), Err(IndexError::NotOpen)));
        assert!(matches!(index.add(b"ACGT", 0), Err(IndexError::NotOpen)));
        assert!(matches!(index.contains(b"ACGT", 0), Err(IndexError::NotOpen)));
        assert!(matches!(
            index.lookup_all_present(&[b"ACGT"]),
            Err(IndexError::NotOpen)
        ));
        assert!(matches!(index.get_column(0), Err(IndexError::NotOpen)));
        assert!(matches!(index.dump(Vec::new()), Err(IndexError::NotOpen)));
        assert!(matches!(
            index.load(&[0u8; 100][..], 1),
            Err(IndexError::NotOpen)
        ));
        assert!(matches!(index.stats(), Err(IndexError::NotOpen)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut index = create_test_index(100, 3);
        index.close().unwrap();
        index.close().unwrap();
        assert!(!index.is_open());
    }

    #[test]
    fn test_open_fresh_store_requires_config() {
        let result = ProbabilisticIndex::open(InMemoryRowStore::new(), None);
        assert!(matches!(result, Err(IndexError::InvalidConfig(_))));
    }

    #[test]
    fn test_reopen_keeps_rows_and_metadata() {
        let mut index = create_test_index(1000, 4);
        let colour = index.register_colour("sample_a").unwrap();
        index.insert_elements(&generate_test_items("a", 20), colour).unwrap();
        index.add(b"lonely", 5).unwrap();

        let store = index.into_store().unwrap();
        let reopened = ProbabilisticIndex::open(store, None).unwrap();

        assert_eq!(reopened.config().size, 1000);
        assert_eq!(reopened.config().num_hashes, 4);
        assert_eq!(reopened.num_colours().unwrap(), 6);
        assert_eq!(reopened.colour_of("sample_a"), Some(colour));
        assert!(reopened.contains(b"lonely", 5).unwrap());
        for item in generate_test_items("a", 20) {
            assert!(reopened.contains(&item, colour).unwrap());
        }
    }

    #[test]
    fn test_stored_config_wins_over_requested() {
        let mut index = create_test_index(1000, 4);
        index.add(b"x", 0).unwrap();
        let store = index.into_store().unwrap();

        let reopened =
            ProbabilisticIndex::open(store, Some(small_config(50, 2))).unwrap();
        assert_eq!(reopened.config().size, 1000);
        assert_eq!(reopened.config().num_hashes, 4);
        assert!(reopened.contains(b"x", 0).unwrap());
    }

    #[test]
    fn test_custom_hasher() {
        let hasher = Arc::new(
            FixedHasher::default()
                .with(b"ACGT", &[1, 2, 3])
                .with(b"TTTT", &[10, 20, 30]),
        );
        let mut index = ProbabilisticIndex::open_with_hasher(
            InMemoryRowStore::new(),
            Some(small_config(100, 3)),
            hasher,
        )
        .unwrap();

        index.add(b"ACGT", 0).unwrap();
        index.add(b"TTTT", 1).unwrap();
        assert_eq!(index.hashes(b"ACGT").unwrap(), vec![1, 2, 3]);
        assert_eq!(index.lookup(b"ACGT").unwrap().to_vec(), vec![0]);
        assert_eq!(index.stats().unwrap().hasher, "fixed");
    }
}

#[cfg(test)]
mod colour_tests {
    use super::*;

    #[test]
    fn test_parse_colour() {
        assert_eq!(parse_colour("0").unwrap(), 0);
        assert_eq!(parse_colour(" 42 ").unwrap(), 42);
        assert!(matches!(parse_colour("-1"), Err(IndexError::InvalidColour(_))));
        assert!(matches!(parse_colour("abc"), Err(IndexError::InvalidColour(_))));
        assert!(matches!(parse_colour(""), Err(IndexError::InvalidColour(_))));
    }

    #[test]
    fn test_colour_limit() {
        let config = MatrixConfigBuilder::default()
            .size(100)
            .num_hashes(2)
            .max_colours(4)
            .build()
            .unwrap();
        let mut index = InMemoryIndex::in_memory(config).unwrap();

        index.add(b"ok", 3).unwrap();
        assert!(matches!(index.add(b"too far", 4), Err(IndexError::InvalidColour(_))));

        let bloom = index.create_bloom_filter(&[b"x"]).unwrap();
        assert!(matches!(index.insert(&bloom, 10), Err(IndexError::InvalidColour(_))));
        assert_eq!(index.num_colours().unwrap(), 4);
    }

    #[test]
    fn test_insert_bloom_filter() {
        let mut index = create_test_index(2000, 3);
        let items = generate_test_items("genome", 100);
        let bloom = index.create_bloom_filter(&items).unwrap();
        assert_eq!(bloom.len(), 2000);

        index.insert(&bloom, 7).unwrap();
        assert_eq!(index.num_colours().unwrap(), 8);
        assert_eq!(index.get_column(7).unwrap(), bloom);
        for item in &items {
            assert!(index.lookup(item).unwrap().contains(7));
        }

        let wrong = index.create_bloom_filter(&items).unwrap()[..1999].to_bitvec();
        assert!(matches!(
            index.insert(&wrong, 0),
            Err(IndexError::BloomLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_registry_assigns_sequential_colours() {
        let mut index = create_test_index(500, 3);
        let a = index.register_colour("a").unwrap();
        let b = index.register_colour("b").unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(index.register_colour("a").unwrap(), 0);
        assert_eq!(index.num_colours().unwrap(), 2);

        index.add(b"x", 5).unwrap();
        let c = index.register_colour("c").unwrap();
        assert_eq!(c, 6);

        assert_eq!(index.colour_of("b"), Some(1));
        assert_eq!(index.colour_of("missing"), None);
        assert_eq!(index.colour_name(6), Some("c"));
        assert_eq!(index.colour_name(5), None);
    }

    #[test]
    fn test_insert_named_and_names_for() {
        let mut index = create_test_index(1000, 3);
        let a_items = generate_test_items("a", 10);
        let bloom = index.create_bloom_filter(&a_items).unwrap();
        let colour = index.insert_named("sample_a", &bloom).unwrap();
        index.add(&a_items[0], 3).unwrap();

        let found = index.lookup(&a_items[0]).unwrap();
        let named: Vec<_> = index.names_for(&found).collect();
        assert_eq!(named, vec![(colour, Some("sample_a")), (3, None)]);
    }

    #[test]
    fn test_remove_colour() {
        let mut index = create_test_index(1000, 3);
        let a = index.register_colour("a").unwrap();
        let b = index.register_colour("b").unwrap();
        index.add(b"shared", a).unwrap();
        index.add(b"shared", b).unwrap();

        let cleared = index.remove_colour(a).unwrap();
        assert!(cleared > 0);
        assert_eq!(index.lookup(b"shared").unwrap().to_vec(), vec![b]);
        assert_eq!(index.colour_of("a"), None);
        assert_eq!(index.colour_name(a), None);

        // ids are not reused
        assert_eq!(index.register_colour("c").unwrap(), 2);
        assert!(matches!(index.remove_colour(10), Err(IndexError::InvalidColour(_))));
    }
}

#[cfg(test)]
mod search_tests {
    use super::*;

    #[test]
    fn test_search_ranks_by_fraction() {
        let mut index = create_test_index(10_000, 3);
        let query = generate_test_items("q", 10);

        index.insert_elements(&query, 0).unwrap();
        index.insert_elements(&query[..5], 1).unwrap();
        index.insert_elements(&generate_test_items("other", 10), 2).unwrap();
        index.register_colour("full").unwrap();

        let hits = index.search(&query, 0.5).unwrap();
        assert!(hits.len() >= 2);
        assert_eq!(hits[0].colour, 0);
        assert_eq!(hits[0].fraction, 1.0);
        assert_eq!(hits[1].colour, 1);
        assert!(hits[1].fraction >= 0.5);
        assert!(hits.windows(2).all(|w| w[0].fraction >= w[1].fraction));
    }

    #[test]
    fn test_search_full_threshold_matches_lookup_all_present() {
        let mut index = create_test_index(5000, 3);
        for colour in 0..6 {
            index
                .insert_elements(&generate_test_items(&format!("s{}", colour % 3), 20), colour)
                .unwrap();
        }

        let query = generate_test_items("s1", 8);
        let mut hits: Vec<usize> = index
            .search(&query, 1.0)
            .unwrap()
            .into_iter()
            .map(|hit| hit.colour)
            .collect();
        hits.sort_unstable();
        assert_eq!(hits, index.lookup_all_present(&query).unwrap().to_vec());
        assert!(hits.contains(&1) && hits.contains(&4));
    }

    #[test]
    fn test_search_names_hits() {
        let mut index = create_test_index(1000, 3);
        let colour = index.register_colour("named").unwrap();
        index.add(b"x", colour).unwrap();

        let hits = index.search(&[b"x"], 1.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name.as_deref(), Some("named"));
    }

    #[test]
    fn test_search_rejects_bad_input() {
        let index = create_test_index(100, 3);
        let empty: Vec<&[u8]> = Vec::new();
        assert!(matches!(index.search(&empty, 0.5), Err(IndexError::EmptyQuery)));
        assert!(matches!(
            index.search(&[b"x"], 0.0),
            Err(IndexError::InvalidThreshold(_))
        ));
        assert!(matches!(
            index.search(&[b"x"], 1.5),
            Err(IndexError::InvalidThreshold(_))
        ));
    }
}

#[cfg(test)]
mod merge_tests {
    use super::*;

    #[test]
    fn test_merge_appends_colours() {
        let mut left = create_test_index(2000, 3);
        let mut right = create_test_index(2000, 3);

        let left_items = generate_test_items("left", 30);
        let right_items = generate_test_items("right", 30);
        let l0 = left.register_colour("l0").unwrap();
        left.insert_elements(&left_items, l0).unwrap();
        left.add(b"tail", 8).unwrap();

        right.insert_elements(&right_items, 0).unwrap();
        let r1 = right.register_colour("r1").unwrap();
        right.insert_elements(&left_items[..5], r1).unwrap();

        let offset = left.merge(&right).unwrap();
        assert_eq!(offset, 9);
        assert_eq!(left.num_colours().unwrap(), 11);
        assert_eq!(left.colour_of("r1"), Some(offset + r1));
        assert_eq!(left.colour_of("l0"), Some(l0));

        for item in &right_items {
            assert!(left.contains(item, offset).unwrap());
        }
        for item in &left_items {
            assert!(left.contains(item, l0).unwrap());
        }
        for item in &left_items[..5] {
            assert!(left.contains(item, offset + r1).unwrap());
        }
        assert!(left.contains(b"tail", 8).unwrap());
        assert_eq!(left.get_column(offset).unwrap(), right.get_column(0).unwrap());
    }

    #[test]
    fn test_merge_rejects_incompatible_config() {
        let mut left = create_test_index(2000, 3);
        let right = create_test_index(2000, 4);
        assert!(matches!(left.merge(&right), Err(IndexError::InvalidConfig(_))));

        let fnv = MatrixConfigBuilder::default()
            .size(2000)
            .num_hashes(3)
            .hash_kind(HashKind::Fnv1a)
            .build()
            .unwrap();
        let right = InMemoryIndex::in_memory(fnv).unwrap();
        assert!(matches!(left.merge(&right), Err(IndexError::InvalidConfig(_))));
    }
}

#[cfg(test)]
mod stats_tests {
    use super::*;

    #[test]
    fn test_stats() {
        let mut index = create_test_index(1000, 3);
        index.register_colour("a").unwrap();
        index.add(b"x", 9).unwrap();

        let stats = index.stats().unwrap();
        assert_eq!(stats.size, 1000);
        assert_eq!(stats.num_hashes, 3);
        assert_eq!(stats.num_colours, 10);
        assert_eq!(stats.named_colours, 1);
        assert_eq!(stats.row_width, 2);
        assert_eq!(stats.hasher, "murmur3");
    }

    #[test]
    fn test_false_positive_rate_grows_with_fill() {
        let mut index = create_test_index(1000, 3);
        assert_eq!(index.estimated_false_positive_rate(0).unwrap(), 0.0);

        index.insert_elements(&generate_test_items("few", 10), 0).unwrap();
        let sparse = index.estimated_false_positive_rate(0).unwrap();
        index.insert_elements(&generate_test_items("many", 300), 0).unwrap();
        let dense = index.estimated_false_positive_rate(0).unwrap();

        assert!(sparse > 0.0);
        assert!(dense > sparse);
        assert!(dense < 1.0);
    }
}
