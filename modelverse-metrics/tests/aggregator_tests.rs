use modelverse_core::{Answer, BenchmarkKind, EvaluationResult, ExtractedChoice, Metrics, SubjectResult};
use modelverse_metrics::aggregators::MetricsAggregator;
use approx::assert_relative_eq;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::tempdir;

fn answer(choice: char, correct: char, latency: f64) -> Answer {
    Answer::new(
        "q".to_string(),
        vec!["a".into(), "b".into(), "c".into(), "d".into()],
        choice.to_string(),
        ExtractedChoice::Letter(choice),
        correct,
        latency,
    )
}

fn two_subject_result() -> EvaluationResult {
    let mut s1 = SubjectResult::new("s1");
    s1.record(answer('A', 'A', 0.1));
    s1.record(answer('B', 'B', 0.1));
    s1.record(answer('C', 'C', 0.1));
    s1.record(answer('A', 'D', 0.1));
    let mut s2 = SubjectResult::new("s2");
    s2.record(answer('A', 'A', 0.3));
    s2.record(answer('A', 'B', 0.3));

    let mut result = EvaluationResult::new(BenchmarkKind::Mmlu);
    result.push(s1);
    result.push(s2);
    result
}

// ===== Artifact Parsing =====

#[tokio::test]
async fn test_parse_written_artifact() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mmlu_results.json");
    let artifact = two_subject_result().to_artifact();
    std::fs::write(&path, serde_json::to_string_pretty(&artifact).unwrap()).unwrap();

    let metrics = MetricsAggregator::parse(&path).await;

    assert_relative_eq!(metrics.accuracy.unwrap(), 4.0 / 6.0);
    assert_relative_eq!(metrics.average_accuracy.unwrap(), 0.625);
    assert_relative_eq!(metrics.custom_metrics["s1_accuracy"], 0.75);
    assert_relative_eq!(metrics.custom_metrics["s2_accuracy"], 0.5);
    assert_eq!(metrics.custom_metrics["total_correct"], 4.0);
    assert_eq!(metrics.custom_metrics["total_questions"], 6.0);
    assert!(metrics.custom_metrics.contains_key("mean_response_time"));
}

#[test]
fn test_from_artifact_matches_parse_str() {
    let artifact = two_subject_result().to_artifact();
    let from_struct = MetricsAggregator::from_artifact(&artifact);
    let from_text =
        MetricsAggregator::parse_str(&serde_json::to_string(&artifact).unwrap()).unwrap();
    assert_eq!(from_struct, from_text);
}

#[tokio::test]
async fn test_missing_file_yields_empty_metrics() {
    let dir = tempdir().unwrap();
    let metrics = MetricsAggregator::parse(dir.path().join("absent.json")).await;
    assert_eq!(metrics, Metrics::default());
}

#[tokio::test]
async fn test_malformed_file_yields_empty_metrics() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{\"overall_accuracy\": 0.5,").unwrap();

    let metrics = MetricsAggregator::parse(&path).await;
    assert!(metrics.is_empty());
}

// ===== Optional Fields =====

#[test]
fn test_optional_metrics_copied_through() {
    let raw = json!({
        "accuracy": 0.4,
        "f1": 0.5,
        "precision": 0.6,
        "recall": 0.7,
        "perplexity": 12.5,
        "bleu": 0.2,
        "rouge": 0.3,
        "exact_match": 0.1
    })
    .to_string();

    let metrics = MetricsAggregator::parse_str(&raw).unwrap();

    assert_eq!(metrics.accuracy, Some(0.4));
    assert_eq!(metrics.overall_accuracy, None);
    assert_eq!(metrics.f1_score, Some(0.5));
    assert_eq!(metrics.precision, Some(0.6));
    assert_eq!(metrics.recall, Some(0.7));
    assert_eq!(metrics.perplexity, Some(12.5));
    assert_eq!(metrics.bleu, Some(0.2));
    assert_eq!(metrics.rouge, Some(0.3));
    assert_eq!(metrics.exact_match, Some(0.1));
}

#[test]
fn test_non_numeric_fields_are_ignored() {
    let raw = json!({ "overall_accuracy": "high", "rouge": { "rouge-l": 0.3 } }).to_string();
    let metrics = MetricsAggregator::parse_str(&raw).unwrap();
    assert_eq!(metrics.accuracy, None);
    assert_eq!(metrics.rouge, None);
}
