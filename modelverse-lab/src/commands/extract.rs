//! `extract`: show which option letter a model response resolves to

use anyhow::{Context as _, Result};
use clap::Args;
use modelverse_core::BenchmarkKind;
use modelverse_metrics::AnswerExtractor;
use serde::Serialize;
use std::io::Read;

use crate::context::Context;
use crate::output::{print_field, OutputFormat};

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Response text; read from stdin when omitted
    pub text: Option<String>,

    #[arg(short, long, default_value = "mmlu")]
    pub benchmark: BenchmarkKind,
}

#[derive(Debug, Serialize, PartialEq)]
struct Extraction {
    choice: String,
    tier: Option<String>,
}

fn extract(text: &str, benchmark: BenchmarkKind) -> Extraction {
    let (choice, tier) = AnswerExtractor::for_benchmark(benchmark).extract_with_tier(text);
    Extraction {
        choice: choice.to_string(),
        tier: tier.map(|t| t.to_string()),
    }
}

pub fn run(ctx: &Context, args: ExtractArgs) -> Result<()> {
    let text = match args.text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read response from stdin")?;
            buf
        }
    };

    let extraction = extract(&text, args.benchmark);
    match ctx.output.format() {
        OutputFormat::Json => ctx.output.json(&extraction)?,
        OutputFormat::Table => {
            print_field("Choice", &extraction.choice);
            print_field("Matched by", extraction.tier.as_deref().unwrap_or("-"));
        }
    }
    Ok(())
}
