use modelverse_core::{BenchmarkKind, ExtractedChoice};
use modelverse_metrics::extraction::{AnomalyFilter, AnswerExtractor, MatchTier};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn mmlu() -> AnswerExtractor {
    AnswerExtractor::for_benchmark(BenchmarkKind::Mmlu)
}

fn pro() -> AnswerExtractor {
    AnswerExtractor::for_benchmark(BenchmarkKind::MmluPro)
}

// ===== Reference Examples =====

#[rstest]
#[case("A", ExtractedChoice::Letter('A'))]
#[case("The answer is B.", ExtractedChoice::Letter('B'))]
#[case(";;;;;;", ExtractedChoice::Unknown)]
#[case("blah blah C appears once", ExtractedChoice::Letter('C'))]
#[case("", ExtractedChoice::Unknown)]
fn test_reference_examples(#[case] text: &str, #[case] expected: ExtractedChoice) {
    assert_eq!(mmlu().extract(text), expected);
}

// ===== Tier Precedence =====

#[rstest]
#[case("D. The mitochondria", MatchTier::LeadingLetter)]
#[case("Answer: c", MatchTier::AnchoredAnswer)]
#[case("Having weighed it, I choose A", MatchTier::ChoicePhrase)]
#[case("it has to be D here", MatchTier::StandaloneToken)]
#[case("pick=(B)", MatchTier::StandaloneToken)]
#[case("pick=B2", MatchTier::MarkedLetter)]
#[case("probably option c", MatchTier::CanonicalPhrase)]
#[case("b) since it is", MatchTier::LeadingChars)]
#[case("The Dogs Bark, Big Bears", MatchTier::FrequencyVote)]
fn test_tier_that_matches(#[case] text: &str, #[case] tier: MatchTier) {
    let (choice, matched) = mmlu().extract_with_tier(text);
    assert_eq!(matched, Some(tier), "text {text:?} gave {choice}");
}

#[test]
fn test_leading_letter_beats_later_phrase() {
    assert_eq!(
        mmlu().extract("C, although the answer is B per some"),
        ExtractedChoice::Letter('C')
    );
}

#[test]
fn test_anchored_answer_beats_standalone_token() {
    assert_eq!(mmlu().extract("My answer: d. A is wrong"), ExtractedChoice::Letter('D'));
}

// ===== Option Sets =====

#[test]
fn test_mmlu_pro_letters() {
    assert_eq!(pro().extract("The answer is H"), ExtractedChoice::Letter('H'));
    assert_eq!(mmlu().extract("The answer is H"), ExtractedChoice::Unknown);
}

#[test]
fn test_pronoun_is_not_option_i() {
    assert_eq!(
        pro().extract("well I believe G is right"),
        ExtractedChoice::Letter('G')
    );
}

// ===== Anomalies =====

#[rstest]
#[case("?!?!?!?!")]
#[case("zzzzzzzz")]
#[case("A;B;C;D;A;B;C and then some more padding text")]
fn test_anomalies_are_unknown(#[case] text: &str) {
    assert_eq!(mmlu().extract(text), ExtractedChoice::Unknown);
}

#[test]
fn test_custom_filter() {
    let extractor = mmlu().with_filter(AnomalyFilter {
        forbidden_separator: ',',
        ..AnomalyFilter::default()
    });
    let text = "A, B, C, D, A, B, but C is best";
    assert_eq!(extractor.extract(text), ExtractedChoice::Unknown);
    assert_eq!(mmlu().extract(text), ExtractedChoice::Letter('A'));
}

#[test]
fn test_extraction_is_deterministic() {
    let text = "Some words, then maybe B or maybe C.";
    let first = mmlu().extract(text);
    for _ in 0..10 {
        assert_eq!(mmlu().extract(text), first);
    }
}
