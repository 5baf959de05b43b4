//! Command-style prompt flags (`--ratio`, `--duration`) for video models.
//!
//! Seedance reads generation knobs from flags at the end of the text prompt.
//! [`PromptDirectives`] appends them unless the prompt already carries one.

/// How an existing flag is detected in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectiveMatch {
    /// Flag text appears anywhere, even inside an unrelated word.
    #[default]
    Substring,
    /// Flag appears as a whitespace-separated token.
    Token,
}

impl DirectiveMatch {
    fn contains(&self, prompt: &str, flag: &str) -> bool {
        match self {
            DirectiveMatch::Substring => prompt.contains(flag),
            DirectiveMatch::Token => prompt.split_whitespace().any(|token| token == flag),
        }
    }
}

const RATIO_FLAG: &str = "--ratio";
const DURATION_FLAGS: [&str; 2] = ["--duration", "--dur"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptDirectives {
    pub ratio: Option<String>,
    pub duration: Option<String>,
    pub matching: DirectiveMatch,
}

impl PromptDirectives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ratio(mut self, ratio: impl Into<String>) -> Self {
        self.ratio = Some(ratio.into());
        self
    }

    pub fn duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = Some(duration.into());
        self
    }

    pub fn matching(mut self, matching: DirectiveMatch) -> Self {
        self.matching = matching;
        self
    }

    /// `"a cat"` with ratio `16:9` and duration `5` becomes
    /// `"a cat --ratio 16:9 --duration 5"`.
    pub fn apply(&self, prompt: &str) -> String {
        let mut out = prompt.to_string();
        if let Some(ratio) = non_empty(&self.ratio) {
            if !self.matching.contains(prompt, RATIO_FLAG) {
                out = format!("{out} {RATIO_FLAG} {ratio}");
            }
        }
        if let Some(duration) = non_empty(&self.duration) {
            if !DURATION_FLAGS
                .iter()
                .any(|flag| self.matching.contains(prompt, flag))
            {
                out = format!("{out} --duration {duration}");
            }
        }
        out
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_ratio_then_duration() {
        let prompt = PromptDirectives::new().ratio("16:9").duration("5").apply("a cat");
        assert_eq!(prompt, "a cat --ratio 16:9 --duration 5");
    }

    #[test]
    fn existing_flags_are_kept() {
        let directives = PromptDirectives::new().ratio("16:9").duration("5");
        assert_eq!(
            directives.apply("a cat --ratio 1:1 --dur 10"),
            "a cat --ratio 1:1 --dur 10"
        );
    }

    #[test]
    fn substring_match_suppresses_on_unrelated_text() {
        let directives = PromptDirectives::new().ratio("16:9");
        assert_eq!(directives.apply("explain --ratios"), "explain --ratios");
        assert_eq!(
            directives
                .clone()
                .matching(DirectiveMatch::Token)
                .apply("explain --ratios"),
            "explain --ratios --ratio 16:9"
        );
    }

    #[test]
    fn empty_values_are_skipped() {
        let directives = PromptDirectives::new().ratio(" ").duration("");
        assert_eq!(directives.apply("a cat"), "a cat");
    }
}
