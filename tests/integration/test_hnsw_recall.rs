//! Search quality and persistence of larger indexes.

use mongoose::vector::{VectorDimension, VectorKey};
use mongoose::{HnswConfig, HnswIndex, IndexPhase};

use crate::common::{TestProject, random_unit_vectors};

const DIMENSION: usize = 16;

fn filled_index(count: usize, config: HnswConfig) -> HnswIndex {
    let mut index = HnswIndex::new(VectorDimension::new(DIMENSION).unwrap(), config).unwrap();
    for (i, v) in random_unit_vectors(count, DIMENSION, 42).iter().enumerate() {
        index.insert(VectorKey::new(i as u64), v).unwrap();
    }
    index
}

/// Fraction of exact top-k neighbors found by the approximate search.
fn recall_at(index: &HnswIndex, queries: &[Vec<f32>], k: usize, expansion: usize) -> f64 {
    let mut found = 0;
    for query in queries {
        let exact = index.exact_search(query, k).unwrap();
        let approx = index.search_with_expansion(query, k, expansion).unwrap();
        found += approx
            .iter()
            .filter(|m| exact.iter().any(|e| e.key == m.key))
            .count();
    }
    found as f64 / (queries.len() * k) as f64
}

#[test]
fn test_recall_improves_with_expansion() {
    let index = filled_index(500, HnswConfig::seeded(5));
    let queries = random_unit_vectors(40, DIMENSION, 99);
    let k = 10;
    // One missed neighbor across the whole query set
    let slack = 1.0 / (queries.len() * k) as f64;

    let sweep: Vec<(usize, f64)> = [10, 20, 40, 80, 160, 500]
        .into_iter()
        .map(|expansion| (expansion, recall_at(&index, &queries, k, expansion)))
        .collect();

    for pair in sweep.windows(2) {
        let ((narrow_ef, narrow), (wide_ef, wide)) = (pair[0], pair[1]);
        assert!(
            wide + slack >= narrow,
            "recall fell from {narrow} at ef={narrow_ef} to {wide} at ef={wide_ef}"
        );
    }

    let (_, first) = sweep[0];
    let (_, last) = sweep[sweep.len() - 1];
    assert!(last >= first, "sweep {sweep:?}");
    assert!(last >= 0.95, "sweep {sweep:?}");
}

#[test]
fn test_large_index_stays_consistent() {
    let mut index = filled_index(400, HnswConfig::seeded(8).with_connectivity(8));
    index.check_consistency().unwrap();
    assert_eq!(index.phase(), IndexPhase::Building);

    index.seal();
    assert_eq!(index.phase(), IndexPhase::Searchable);
    assert_eq!(index.len(), 400);
    for layer in 0..=index.max_level() {
        let bound = index.config().max_degree(layer);
        for i in 0..400 {
            let neighbors = index.neighbors(VectorKey::new(i), layer);
            assert!(neighbors.len() <= bound);
        }
    }
}

#[test]
fn test_reloaded_index_searches_identically() {
    let project = TestProject::new();
    let path = project.path().join("index.bin");
    let index = filled_index(300, HnswConfig::seeded(13));
    index.save(&path).unwrap();

    let loaded = HnswIndex::load(&path).unwrap();

    for query in random_unit_vectors(20, DIMENSION, 7) {
        assert_eq!(
            index.search(&query, 10).unwrap(),
            loaded.search(&query, 10).unwrap()
        );
    }
    assert_eq!(loaded.entry_point(), index.entry_point());
}
