use modelverse_core::{CoreError, Metrics, Result, ResultArtifact};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, warn};

use crate::calculators::LatencyMetrics;

/// Keys copied through verbatim when present as numbers.
const PASSTHROUGH_KEYS: [&str; 7] = [
    "f1_score",
    "precision",
    "recall",
    "perplexity",
    "bleu",
    "rouge",
    "exact_match",
];

/// Turns an evaluation result artifact into a normalized [`Metrics`] record.
///
/// Parsing never fails: a missing or malformed artifact yields
/// `Metrics::default()` and a warning.
pub struct MetricsAggregator;

impl MetricsAggregator {
    pub async fn parse(path: impl AsRef<Path>) -> Metrics {
        let path = path.as_ref();
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "result artifact unreadable");
                return Metrics::default();
            }
        };
        Self::parse_str(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "result artifact malformed");
            Metrics::default()
        })
    }

    /// Fails with [`CoreError::ArtifactParse`] when the text is not a JSON object.
    pub fn parse_str(raw: &str) -> Result<Metrics> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(Self::from_map(&map)),
            Ok(other) => {
                let kind = match other {
                    Value::Array(_) => "array",
                    Value::String(_) => "string",
                    Value::Number(_) => "number",
                    Value::Bool(_) => "bool",
                    _ => "null",
                };
                Err(CoreError::ArtifactParse(format!("expected an object, found {kind}")))
            }
            Err(e) => {
                debug!(error = %e, "artifact is not valid JSON");
                Err(CoreError::ArtifactParse(e.to_string()))
            }
        }
    }

    pub fn from_artifact(artifact: &ResultArtifact) -> Metrics {
        match serde_json::to_value(artifact) {
            Ok(Value::Object(map)) => Self::from_map(&map),
            _ => Metrics::default(),
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> Metrics {
        let number = |key: &str| map.get(key).and_then(Value::as_f64);

        let overall_accuracy = number("overall_accuracy");
        let average_accuracy = number("average_accuracy");

        let mut metrics = Metrics {
            accuracy: overall_accuracy
                .or(average_accuracy)
                .or_else(|| number("accuracy")),
            overall_accuracy,
            average_accuracy,
            ..Metrics::default()
        };

        for key in PASSTHROUGH_KEYS {
            let Some(value) = number(key) else { continue };
            match key {
                "f1_score" => metrics.f1_score = Some(value),
                "precision" => metrics.precision = Some(value),
                "recall" => metrics.recall = Some(value),
                "perplexity" => metrics.perplexity = Some(value),
                "bleu" => metrics.bleu = Some(value),
                "rouge" => metrics.rouge = Some(value),
                "exact_match" => metrics.exact_match = Some(value),
                _ => {}
            }
        }
        if metrics.f1_score.is_none() {
            metrics.f1_score = number("f1");
        }

        for key in ["total_correct", "total_questions", "unknown_rate", "sample_errors"] {
            if let Some(value) = number(key) {
                metrics.custom_metrics.insert(key.to_string(), value);
            }
        }

        let mut latencies = Vec::new();
        if let Some(subjects) = map.get("subject_results").and_then(Value::as_object) {
            for (subject, result) in subjects {
                if let Some(accuracy) = result.get("accuracy").and_then(Value::as_f64) {
                    metrics
                        .custom_metrics
                        .insert(format!("{subject}_accuracy"), accuracy);
                }
                let answers = result.get("answers").and_then(Value::as_array);
                latencies.extend(
                    answers
                        .into_iter()
                        .flatten()
                        .filter_map(|answer| answer.get("response_time").and_then(Value::as_f64)),
                );
            }
        }

        if !latencies.is_empty() {
            let latency = LatencyMetrics::from_measurements(&latencies);
            metrics
                .custom_metrics
                .insert("mean_response_time".to_string(), latency.mean);
            metrics
                .custom_metrics
                .insert("p95_response_time".to_string(), latency.p95);
        }

        metrics
    }
}
