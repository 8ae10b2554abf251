//! Cross-modal retrieval quality: recall@1 and recall@10.
//!
//! Row `i` of the reference matrix and row `i` of the query matrix embed the
//! same underlying item, so the ground truth for query `i` is key `i`. The
//! evaluator indexes the reference rows in a throwaway [`HnswIndex`] and
//! runs every query against it in parallel.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::error::{EvalError, IndexError};
use crate::hnsw::{HnswConfig, HnswIndex};
use crate::vector::{Matrix, VectorError, VectorKey};

/// Neighbors needed to score recall@10.
pub const RECALL_DEPTH: usize = 10;

/// Recall of one retrieval direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecallReport {
    pub recall_at_1: f64,
    pub recall_at_10: f64,
    pub queries: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Recall in both directions between two paired matrices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SymmetricReport {
    /// First matrix indexed, second used as queries
    pub forward: RecallReport,
    /// Second matrix indexed, first used as queries
    pub backward: RecallReport,
}

#[derive(Debug, Clone)]
pub struct RetrievalEvaluator {
    config: HnswConfig,
    threads: usize,
    k: usize,
}

impl RetrievalEvaluator {
    pub fn new(config: HnswConfig) -> Self {
        Self {
            config,
            threads: num_cpus::get(),
            k: RECALL_DEPTH,
        }
    }

    /// Worker threads for the query phase; 0 means one per CPU.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Neighbors fetched per query; must be at least 10.
    #[must_use]
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Recall of `queries[i]` retrieving `reference[i]`.
    pub fn evaluate(&self, reference: &Matrix, queries: &Matrix) -> Result<RecallReport, EvalError> {
        if self.k < RECALL_DEPTH {
            return Err(IndexError::config(format!(
                "evaluation k must be at least {RECALL_DEPTH}, got {}",
                self.k
            ))
            .into());
        }
        if reference.rows() != queries.rows() {
            return Err(EvalError::RowCountMismatch {
                reference: reference.rows(),
                queries: queries.rows(),
            });
        }
        if reference.rows() == 0 {
            return Err(EvalError::Empty);
        }
        if reference.dimension() != queries.dimension() {
            return Err(IndexError::from(VectorError::DimensionMismatch {
                expected: reference.dimension().get(),
                actual: queries.dimension().get(),
            })
            .into());
        }

        let started = Instant::now();
        let index = self.index_rows(reference)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| IndexError::config(format!("Failed to start evaluation threads: {e}")))?;

        let hits: Vec<(bool, bool)> = pool.install(|| {
            (0..queries.rows())
                .into_par_iter()
                .map(|i| {
                    let expected = VectorKey::new(i as u64);
                    let matches = index.search(queries.row(i), self.k)?;
                    let top1 = matches.first().is_some_and(|m| m.key == expected);
                    let top10 = matches
                        .iter()
                        .take(RECALL_DEPTH)
                        .any(|m| m.key == expected);
                    Ok((top1, top10))
                })
                .collect::<Result<Vec<_>, IndexError>>()
        })?;

        let n = hits.len() as f64;
        let report = RecallReport {
            recall_at_1: hits.iter().filter(|(top1, _)| *top1).count() as f64 / n,
            recall_at_10: hits.iter().filter(|(_, top10)| *top10).count() as f64 / n,
            queries: hits.len(),
            elapsed: started.elapsed(),
        };
        info!(
            "Recall@1 {:.4}, Recall@10 {:.4} over {} queries in {:.2}s",
            report.recall_at_1,
            report.recall_at_10,
            report.queries,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    /// Recall measured both ways between `a` and `b`.
    pub fn evaluate_symmetric(&self, a: &Matrix, b: &Matrix) -> Result<SymmetricReport, EvalError> {
        Ok(SymmetricReport {
            forward: self.evaluate(a, b)?,
            backward: self.evaluate(b, a)?,
        })
    }

    fn index_rows(&self, matrix: &Matrix) -> Result<HnswIndex, IndexError> {
        let mut index = HnswIndex::new(matrix.dimension(), self.config.clone())?;
        for (i, row) in matrix.iter_rows().enumerate() {
            index.insert(VectorKey::new(i as u64), row)?;
        }
        index.seal();
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn evaluator() -> RetrievalEvaluator {
        RetrievalEvaluator::new(HnswConfig::seeded(17)).with_threads(2)
    }

    fn matrix(rows: &[Vec<f32>]) -> Matrix {
        Matrix::from_rows(rows).unwrap()
    }

    #[test]
    fn test_identical_pairs_have_perfect_recall() {
        let rows = vec![
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0],
            vec![0.0, 0.0, 0.0, 1.0],
        ];
        let report = evaluator()
            .evaluate(&matrix(&rows), &matrix(&rows))
            .unwrap();
        assert_eq!(report.recall_at_1, 1.0);
        assert_eq!(report.recall_at_10, 1.0);
        assert_eq!(report.queries, 4);
    }

    #[test]
    fn test_swapped_pairs_miss_top1_but_hit_top10() {
        let reference = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let queries = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let report = evaluator()
            .evaluate(&matrix(&reference), &matrix(&queries))
            .unwrap();
        assert_eq!(report.recall_at_1, 0.0);
        assert_eq!(report.recall_at_10, 1.0);
    }

    #[test]
    fn test_noisy_pairs_on_larger_set() {
        let mut rng = StdRng::seed_from_u64(5);
        let reference: Vec<Vec<f32>> = (0..300)
            .map(|_| (0..16).map(|_| rng.random_range(-1.0..1.0)).collect())
            .collect();
        let queries: Vec<Vec<f32>> = reference
            .iter()
            .map(|row| row.iter().map(|x| x + rng.random_range(-0.01..0.01)).collect())
            .collect();

        let report = evaluator()
            .evaluate(&matrix(&reference), &matrix(&queries))
            .unwrap();
        assert!(report.recall_at_1 >= 0.95, "{report:?}");
        assert!(report.recall_at_10 >= report.recall_at_1);
    }

    #[test]
    fn test_row_count_mismatch() {
        let err = evaluator()
            .evaluate(&matrix(&[vec![1.0]]), &matrix(&[vec![1.0], vec![0.5]]))
            .unwrap_err();
        assert!(matches!(
            err,
            EvalError::RowCountMismatch {
                reference: 1,
                queries: 2
            }
        ));
    }

    #[test]
    fn test_dimension_mismatch_is_config_error() {
        let err = evaluator()
            .evaluate(&matrix(&[vec![1.0, 0.0]]), &matrix(&[vec![1.0, 0.0, 0.0]]))
            .unwrap_err();
        match err {
            EvalError::Index(e) => assert!(e.is_config_error()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_small_k_is_rejected() {
        let rows = vec![vec![1.0, 0.0]];
        let err = evaluator()
            .with_k(5)
            .evaluate(&matrix(&rows), &matrix(&rows))
            .unwrap_err();
        assert!(matches!(err, EvalError::Index(IndexError::ConfigError { .. })));
    }

    #[test]
    fn test_symmetric_report() {
        let a = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]];
        let b = vec![vec![0.9, 0.1, 0.0], vec![0.1, 0.9, 0.0], vec![0.0, 0.1, 0.9]];
        let report = evaluator()
            .evaluate_symmetric(&matrix(&a), &matrix(&b))
            .unwrap();
        assert_eq!(report.forward.recall_at_1, 1.0);
        assert_eq!(report.backward.recall_at_1, 1.0);
    }
}
