use crate::model::QuestionType;
use once_cell::sync::Lazy;
use regex::Regex;

struct TypePatterns {
    question_type: QuestionType,
    patterns: &'static [&'static str],
}

const PATTERN_TABLE: &[(QuestionType, &[&str])] = &[
    (
        QuestionType::Definition,
        &[
            r"\bwhat is\b",
            r"\bdefine\b",
            r"\bmeaning of\b",
            r"\bwhat are\b",
            r"\bwhat does\b",
            r"\bwhat do\b",
        ],
    ),
    (
        QuestionType::Explanation,
        &[
            r"\bhow does\b",
            r"\bwhy does\b",
            r"\bexplain\b",
            r"\bhow can\b",
            r"\bwhy is\b",
            r"\bwhy are\b",
            r"\bhow do\b",
            r"\bwhy would\b",
        ],
    ),
    (
        QuestionType::Comparison,
        &[
            r"\bdifference between\b",
            r"\bcompare\b",
            r"\bversus\b",
            r"\bvs\b",
            r"\bdiffers from\b",
            r"\bsimilar to\b",
            r"\bcompared to\b",
            r"\bcontrast\b",
        ],
    ),
    (
        QuestionType::Procedure,
        &[
            r"\bhow to\b",
            r"\bsteps to\b",
            r"\bprocess of\b",
            r"\bprocedure for\b",
            r"\bmethod to\b",
            r"\bway to\b",
        ],
    ),
    (
        QuestionType::Application,
        &[
            r"\bexample of\b",
            r"\bgive an example\b",
            r"\bshow\b",
            r"\bdemonstrate\b",
            r"\bapply\b",
            r"\buse\b",
            r"\bprovide an example\b",
            r"\bcan you show\b",
        ],
    ),
    (
        QuestionType::Evaluation,
        &[
            r"\bis it true\b",
            r"\bis it correct\b",
            r"\bevaluate\b",
            r"\bshould\b",
            r"\bcould\b",
            r"\bwould\b",
            r"\bis this\b",
            r"\bcan\b",
            r"\bwill\b",
        ],
    ),
];

static COMPILED: Lazy<Vec<TypePatterns>> = Lazy::new(|| {
    PATTERN_TABLE
        .iter()
        .map(|(question_type, patterns)| TypePatterns {
            question_type: *question_type,
            patterns,
        })
        .collect()
});

static COMPILED_REGEX: Lazy<Vec<Vec<Regex>>> = Lazy::new(|| {
    COMPILED
        .iter()
        .map(|t| {
            t.patterns
                .iter()
                .map(|p| Regex::new(p).expect("static pattern must compile"))
                .collect()
        })
        .collect()
});

/// Rule-based classification over a fixed pattern dictionary; no ML.
/// `general` is the default bucket for unmatched or empty questions.
pub fn classify_question(question: &str) -> (QuestionType, f32) {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return (QuestionType::General, 0.0);
    }
    let lowered = trimmed.to_lowercase();

    let mut best: Option<(usize, usize)> = None; // (table index, score)
    for (idx, regexes) in COMPILED_REGEX.iter().enumerate() {
        let score = regexes.iter().filter(|re| re.is_match(&lowered)).count();
        if score > 0 {
            match best {
                Some((_, best_score)) if best_score >= score => {}
                _ => best = Some((idx, score)),
            }
        }
    }

    match best {
        None => (QuestionType::General, 0.5),
        Some((idx, score)) => {
            let total_patterns = COMPILED[idx].patterns.len() as f32;
            let confidence = (score as f32 / total_patterns).min(1.0);
            (COMPILED[idx].question_type, (confidence * 100.0).round() / 100.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_question_classified() {
        let (t, confidence) = classify_question("What is a covalent bond?");
        assert_eq!(t, QuestionType::Definition);
        assert!(confidence > 0.0);
    }

    #[test]
    fn empty_question_is_general_zero_confidence() {
        let (t, confidence) = classify_question("   ");
        assert_eq!(t, QuestionType::General);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn unmatched_question_is_general_half_confidence() {
        let (t, confidence) = classify_question("Hydrogen bonds in water.");
        assert_eq!(t, QuestionType::General);
        assert_eq!(confidence, 0.5);
    }
}
