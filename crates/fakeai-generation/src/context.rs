//! Context-window validation: `prompt_tokens + max_tokens <= context_window`.

use fakeai_core::error::Error;

pub fn validate_context_window(context_window: u32, prompt_tokens: u32, max_tokens: u32) -> Result<(), Error> {
    let total_tokens = prompt_tokens.saturating_add(max_tokens);
    if total_tokens > context_window {
        return Err(Error::ContextLengthExceeded {
            context_window,
            prompt_tokens,
            completion_tokens: max_tokens,
            total_tokens,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_when_within_window() {
        assert!(validate_context_window(8192, 100, 100).is_ok());
    }

    #[test]
    fn fails_when_prompt_plus_max_exceeds_window() {
        let err = validate_context_window(8192, 7000, 2000).unwrap_err();
        assert!(err.to_string().contains("8192"));
    }
}
