//! ResultValidator: turns a raw model response into a confidence score on
//! the validator's [0,1] scale, cheaply and deterministically, without a
//! second LLM call.
//!
//! A response scores low when it's empty, trivially short, or an echo of
//! the prompt (templated light-executor calls bypass the Router's own
//! echo check, so this re-checks at the worker level).

const MIN_USEFUL_CHARS: usize = 20;

/// Score `text` (the model's response to `prompt`) on [0,1].
///
/// 0.0 for empty/near-empty responses, 1.0 for anything reasonably
/// substantial; length alone is a crude proxy, but matches the spec's
/// "validator threshold 0.5" framing as a coarse admit/reject gate, not a
/// quality score.
pub fn validate(prompt: &str, text: &str) -> f32 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if trimmed.len() < MIN_USEFUL_CHARS {
        return 0.3;
    }
    if trimmed.eq_ignore_ascii_case(prompt.trim()) {
        return 0.0;
    }
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_response_scores_zero() {
        assert_eq!(validate("do the thing", ""), 0.0);
    }

    #[test]
    fn short_response_scores_below_threshold() {
        assert!(validate("do the thing", "ok") < 0.5);
    }

    #[test]
    fn substantial_response_scores_above_threshold() {
        assert!(validate("do the thing", "Here is a complete, detailed answer to your request.") > 0.5);
    }

    #[test]
    fn echoing_the_prompt_scores_zero() {
        assert_eq!(validate("do the thing please", "do the thing please"), 0.0);
    }
}
