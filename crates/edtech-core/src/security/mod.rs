pub mod classifier;
pub mod prompt_injection;

pub use classifier::classify_question;
pub use prompt_injection::{
    contains_leak_marker, detect_prompt_injection, sanitize_input, validate_question,
    ValidationOutcome, SUSPICIOUS_PATTERNS,
};
