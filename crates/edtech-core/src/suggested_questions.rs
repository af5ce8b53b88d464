//! Deterministic subject-keyed fallback for suggested-question generation
//! (spec §4.7 step 8), grounded in
//! `question_generator.py::get_fallback_questions`. The LLM-generation
//! path lives in `rag-api-server::services::ingestion`; this module only
//! supplies the "never block the upload response" fallback.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestedQuestion {
    pub question: String,
    pub category: &'static str,
    pub difficulty: &'static str,
}

fn templates_for(subject: &str) -> Vec<SuggestedQuestion> {
    match subject {
        "Chemistry" => vec![
            sq("What are the fundamental concepts in this chemistry topic?", "definition", "easy"),
            sq("Explain the chemical reactions and processes described.", "explanation", "medium"),
            sq("How do these chemical principles compare to other concepts?", "comparison", "medium"),
            sq("What are the step-by-step procedures for calculations?", "procedure", "hard"),
            sq(
                "How can these chemistry concepts be applied to real-world problems?",
                "application",
                "hard",
            ),
        ],
        "Physics" => vec![
            sq("Define the key physics terms and laws.", "definition", "easy"),
            sq("Explain the physical phenomena described in this document.", "explanation", "medium"),
            sq("Compare different physics theories or models.", "comparison", "medium"),
            sq("How do I solve physics problems using these equations?", "procedure", "hard"),
            sq("Apply these physics principles to practical scenarios.", "application", "hard"),
        ],
        "Biology" => vec![
            sq("What are the main biological concepts covered?", "definition", "easy"),
            sq("Explain the biological processes and mechanisms.", "explanation", "medium"),
            sq("How do different biological systems compare?", "comparison", "medium"),
            sq("Describe the experimental procedures in biology.", "procedure", "hard"),
            sq(
                "How can these biological concepts be applied in medicine?",
                "application",
                "hard",
            ),
        ],
        "Mathematics" => vec![
            sq("What are the key mathematical definitions and theorems?", "definition", "easy"),
            sq(
                "Explain the mathematical concepts and their significance.",
                "explanation",
                "medium",
            ),
            sq("Compare different mathematical approaches or methods.", "comparison", "medium"),
            sq("What are the steps to solve these types of problems?", "procedure", "hard"),
            sq("Apply these mathematical concepts to word problems.", "application", "hard"),
        ],
        _ => Vec::new(),
    }
}

fn sq(question: &str, category: &'static str, difficulty: &'static str) -> SuggestedQuestion {
    SuggestedQuestion {
        question: question.to_string(),
        category,
        difficulty,
    }
}

/// Up to 5 deterministic questions for `subject`; a generic template set
/// when the subject has no dedicated bank.
pub fn fallback_for_subject(subject: Option<&str>) -> Vec<SuggestedQuestion> {
    let subject = subject.unwrap_or("General");
    let mut templates = templates_for(subject);
    if templates.is_empty() {
        templates = vec![
            sq(
                &format!("What are the main concepts in this {subject} document?"),
                "definition",
                "easy",
            ),
            sq("Explain the key topics covered in detail.", "explanation", "medium"),
            sq("How do these concepts relate to each other?", "comparison", "medium"),
            sq(
                "What are the practical applications of these concepts?",
                "application",
                "hard",
            ),
            sq("What should I focus on for exam preparation?", "evaluation", "medium"),
        ];
    }
    templates.truncate(5);
    templates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_subject_yields_subject_specific_bank() {
        let qs = fallback_for_subject(Some("Physics"));
        assert_eq!(qs.len(), 5);
        assert!(qs[0].question.contains("physics") || qs[0].question.contains("physics terms"));
    }

    #[test]
    fn unknown_subject_yields_generic_bank_capped_at_five() {
        let qs = fallback_for_subject(Some("History"));
        assert_eq!(qs.len(), 5);
        assert!(qs[0].question.contains("History"));
    }

    #[test]
    fn missing_subject_defaults_to_general() {
        let qs = fallback_for_subject(None);
        assert_eq!(qs.len(), 5);
        assert!(qs[0].question.contains("General"));
    }
}
