//! Recall evaluation over paired matrices stored on disk.

use mongoose::error::EvalError;
use mongoose::io::ExitCode;
use mongoose::semantic::RetrievalEvaluator;
use mongoose::vector::{Matrix, load_matrix, save_matrix};
use mongoose::{HnswConfig, Precision};

use crate::common::{TestProject, perturbed, random_unit_vectors};

fn evaluator() -> RetrievalEvaluator {
    RetrievalEvaluator::new(HnswConfig::seeded(11).with_precision(Precision::F32)).with_threads(2)
}

#[test]
fn test_identical_matrices_have_perfect_recall() {
    let project = TestProject::new();
    let rows = random_unit_vectors(200, 24, 1);
    let path = project.path().join("code.fbin");
    save_matrix(&path, &Matrix::from_rows(&rows).unwrap()).unwrap();

    let matrix = load_matrix(&path).unwrap();
    let report = evaluator().evaluate_symmetric(&matrix, &matrix).unwrap();

    assert_eq!(report.forward.queries, 200);
    assert_eq!(report.forward.recall_at_1, 1.0);
    assert_eq!(report.forward.recall_at_10, 1.0);
    assert_eq!(report.backward.recall_at_10, 1.0);
}

#[test]
fn test_noisy_pairs_are_mostly_recovered() {
    let project = TestProject::new();
    let code = random_unit_vectors(300, 32, 2);
    let docs = perturbed(&code, 0.05, 3);
    let code_path = project.path().join("code.hbin");
    let docs_path = project.path().join("docs.hbin");
    save_matrix(&code_path, &Matrix::from_rows(&code).unwrap()).unwrap();
    save_matrix(&docs_path, &Matrix::from_rows(&docs).unwrap()).unwrap();

    let report = evaluator()
        .evaluate(&load_matrix(&code_path).unwrap(), &load_matrix(&docs_path).unwrap())
        .unwrap();

    assert!(report.recall_at_10 >= 0.95, "recall@10 {}", report.recall_at_10);
    assert!(report.recall_at_1 <= report.recall_at_10);
}

#[test]
fn test_row_count_mismatch_is_config_error() {
    let a = Matrix::from_rows(&random_unit_vectors(12, 8, 4)).unwrap();
    let b = Matrix::from_rows(&random_unit_vectors(11, 8, 5)).unwrap();

    let err = evaluator().evaluate(&a, &b).unwrap_err();

    assert!(matches!(
        err,
        EvalError::RowCountMismatch {
            reference: 12,
            queries: 11
        }
    ));
    assert_eq!(ExitCode::from_eval_error(&err), ExitCode::ConfigError);
}

#[test]
fn test_unreadable_matrix_is_io_error() {
    let project = TestProject::new();
    let path = project.add_file("broken.fbin", "xx");

    let err = load_matrix(&path).unwrap_err();

    assert_eq!(ExitCode::from_vector_error(&err), ExitCode::IoError);
}
