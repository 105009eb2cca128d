pub mod evaluate;
pub mod extract;
pub mod metrics;
pub mod serve;

pub use evaluate::EvaluateArgs;
pub use extract::ExtractArgs;
pub use metrics::MetricsArgs;
pub use serve::ServeArgs;

/// Served model name derived from a model id or path: its last segment.
pub fn default_served_name(model: &str) -> String {
    model
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(model)
        .to_string()
}
