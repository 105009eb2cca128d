//! Cascade tiers. Each matcher takes trimmed text and the valid option
//! letters (uppercase) and returns the letter it found, if any.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static ANCHORED_ANSWER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\banswer\s*:\s*\(?([a-z])\b").expect("valid anchored answer regex")
});

static CHOICE_PHRASE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i:\bi\s+choose|\banswer\s+is)\s*:?\s*\(?([A-Z])\b")
        .expect("valid choice phrase regex")
});

static STANDALONE_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z])\b").expect("valid standalone token regex"));

static CANONICAL_PHRASE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:option|choice)\s*[:#]?\s*\(?([a-z])\b")
        .expect("valid canonical phrase regex")
});

/// `answer:` must start within this many characters of the text start.
const ANCHOR_WINDOW: usize = 20;
const LEADING_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchTier {
    LeadingLetter,
    AnchoredAnswer,
    ChoicePhrase,
    StandaloneToken,
    MarkedLetter,
    CanonicalPhrase,
    LeadingChars,
    FrequencyVote,
}

impl MatchTier {
    /// Evaluation order. First match wins.
    pub const CASCADE: [MatchTier; 8] = [
        MatchTier::LeadingLetter,
        MatchTier::AnchoredAnswer,
        MatchTier::ChoicePhrase,
        MatchTier::StandaloneToken,
        MatchTier::MarkedLetter,
        MatchTier::CanonicalPhrase,
        MatchTier::LeadingChars,
        MatchTier::FrequencyVote,
    ];

    pub fn apply(&self, text: &str, letters: &[char]) -> Option<char> {
        match self {
            MatchTier::LeadingLetter => leading_letter(text, letters),
            MatchTier::AnchoredAnswer => anchored_answer(text, letters),
            MatchTier::ChoicePhrase => choice_phrase(text, letters),
            MatchTier::StandaloneToken => standalone_token(text, letters),
            MatchTier::MarkedLetter => marked_letter(text, letters),
            MatchTier::CanonicalPhrase => canonical_phrase(text, letters),
            MatchTier::LeadingChars => leading_chars(text, letters),
            MatchTier::FrequencyVote => frequency_vote(text, letters),
        }
    }
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchTier::LeadingLetter => "leading_letter",
            MatchTier::AnchoredAnswer => "anchored_answer",
            MatchTier::ChoicePhrase => "choice_phrase",
            MatchTier::StandaloneToken => "standalone_token",
            MatchTier::MarkedLetter => "marked_letter",
            MatchTier::CanonicalPhrase => "canonical_phrase",
            MatchTier::LeadingChars => "leading_chars",
            MatchTier::FrequencyVote => "frequency_vote",
        };
        f.write_str(s)
    }
}

fn option_letter(c: char, letters: &[char]) -> Option<char> {
    letters.contains(&c).then_some(c)
}

fn first_valid_capture(re: &Regex, text: &str, letters: &[char], fold_case: bool) -> Option<char> {
    re.captures_iter(text).find_map(|caps| {
        let c = caps.get(1)?.as_str().chars().next()?;
        let c = if fold_case { c.to_ascii_uppercase() } else { c };
        option_letter(c, letters)
    })
}

/// First non-whitespace character is an option letter not followed by
/// another letter: `"B"`, `"C. Paris"`, but not `"Because"`.
pub fn leading_letter(text: &str, letters: &[char]) -> Option<char> {
    let mut chars = text.trim_start().chars();
    let first = option_letter(chars.next()?, letters)?;
    match chars.next() {
        Some(next) if next.is_alphabetic() => None,
        _ => Some(first),
    }
}

/// `answer: x` starting near the beginning of the text.
pub fn anchored_answer(text: &str, letters: &[char]) -> Option<char> {
    let caps = ANCHORED_ANSWER_RE.captures(text)?;
    let whole = caps.get(0)?;
    if text[..whole.start()].chars().count() > ANCHOR_WINDOW {
        return None;
    }
    let c = caps.get(1)?.as_str().chars().next()?;
    option_letter(c.to_ascii_uppercase(), letters)
}

/// `I choose X` or `answer is X`, with an uppercase letter.
pub fn choice_phrase(text: &str, letters: &[char]) -> Option<char> {
    first_valid_capture(&CHOICE_PHRASE_RE, text, letters, false)
}

/// A single uppercase letter standing alone as a word. The pronoun
/// "I" followed by a lowercase word is not a token.
pub fn standalone_token(text: &str, letters: &[char]) -> Option<char> {
    STANDALONE_TOKEN_RE.captures_iter(text).find_map(|caps| {
        let m = caps.get(1)?;
        let c = m.as_str().chars().next()?;
        if c == 'I' && is_pronoun(&text[m.end()..]) {
            return None;
        }
        option_letter(c, letters)
    })
}

fn is_pronoun(rest: &str) -> bool {
    let mut chars = rest.chars();
    matches!(chars.next(), Some(c) if c.is_whitespace())
        && rest.trim_start().starts_with(|c: char| c.is_lowercase())
}

/// First uppercase option letter anywhere that is not capitalising a
/// word, e.g. `"(B)"`, `"answer=C"`, `"D2"`.
pub fn marked_letter(text: &str, letters: &[char]) -> Option<char> {
    let chars: Vec<char> = text.chars().collect();
    chars.iter().enumerate().find_map(|(i, &c)| {
        let letter = option_letter(c, letters)?;
        match chars.get(i + 1) {
            Some(next) if next.is_lowercase() => None,
            _ => Some(letter),
        }
    })
}

/// `option b`, `choice: C`, case-insensitive.
pub fn canonical_phrase(text: &str, letters: &[char]) -> Option<char> {
    first_valid_capture(&CANONICAL_PHRASE_RE, text, letters, true)
}

/// Any option letter among the first three characters, case-insensitive.
pub fn leading_chars(text: &str, letters: &[char]) -> Option<char> {
    text.chars()
        .take(LEADING_WINDOW)
        .find_map(|c| option_letter(c.to_ascii_uppercase(), letters))
}

/// The option letter with the most uppercase occurrences. Ties go to
/// the letter that comes first in option order.
pub fn frequency_vote(text: &str, letters: &[char]) -> Option<char> {
    let mut best: Option<(char, usize)> = None;
    for &letter in letters {
        let count = text.chars().filter(|c| *c == letter).count();
        if count == 0 {
            continue;
        }
        match best {
            Some((_, top)) if top >= count => {}
            _ => best = Some((letter, count)),
        }
    }
    best.map(|(letter, _)| letter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ABCD: [char; 4] = ['A', 'B', 'C', 'D'];

    #[rstest]
    #[case("A", Some('A'))]
    #[case("B. Because the sky is blue", Some('B'))]
    #[case("  D)", Some('D'))]
    #[case("Because", None)]
    #[case("E", None)]
    #[case("", None)]
    fn test_leading_letter(#[case] text: &str, #[case] expected: Option<char>) {
        assert_eq!(leading_letter(text, &ABCD), expected);
    }

    #[rstest]
    #[case("Answer: C", Some('C'))]
    #[case("Final answer: b", Some('B'))]
    #[case("my answer:(d) is it", Some('D'))]
    #[case("After a great deal of thought, answer: C", None)]
    #[case("answer: E", None)]
    fn test_anchored_answer(#[case] text: &str, #[case] expected: Option<char>) {
        assert_eq!(anchored_answer(text, &ABCD), expected);
    }

    #[rstest]
    #[case("The answer is B.", Some('B'))]
    #[case("After reviewing, I choose D", Some('D'))]
    #[case("I think the Answer Is (A)", Some('A'))]
    #[case("the answer is b", None)]
    fn test_choice_phrase(#[case] text: &str, #[case] expected: Option<char>) {
        assert_eq!(choice_phrase(text, &ABCD), expected);
    }

    #[test]
    fn test_standalone_token_skips_pronoun() {
        let letters: Vec<char> = ('A'..='J').collect();
        assert_eq!(standalone_token("so I think C fits", &letters), Some('C'));
        assert_eq!(standalone_token("blah blah C appears once", &ABCD), Some('C'));
        assert_eq!(standalone_token("Clearly correct", &ABCD), None);
    }

    #[test]
    fn test_marked_letter() {
        assert_eq!(marked_letter("pick=C2", &ABCD), Some('C'));
        assert_eq!(marked_letter("Dogs and Cats", &ABCD), None);
    }

    #[rstest]
    #[case("go with option b", Some('B'))]
    #[case("Choice: d", Some('D'))]
    #[case("choice #a", Some('A'))]
    #[case("options abound", None)]
    fn test_canonical_phrase(#[case] text: &str, #[case] expected: Option<char>) {
        assert_eq!(canonical_phrase(text, &ABCD), expected);
    }

    #[test]
    fn test_leading_chars() {
        assert_eq!(leading_chars("(c) seems right", &ABCD), Some('C'));
        assert_eq!(leading_chars("xyz d", &ABCD), None);
    }

    #[test]
    fn test_frequency_vote_ties_go_to_earlier_option() {
        assert_eq!(frequency_vote("Dogs Bark, Dogs Bite", &ABCD), Some('B'));
        assert_eq!(frequency_vote("Dogs Dig Big", &ABCD), Some('D'));
        assert_eq!(frequency_vote("no capitals", &ABCD), None);
    }

    #[test]
    fn test_cascade_order_is_fixed() {
        assert_eq!(MatchTier::CASCADE[0], MatchTier::LeadingLetter);
        assert_eq!(MatchTier::CASCADE[7], MatchTier::FrequencyVote);
    }
}
