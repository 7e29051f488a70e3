use crate::evaluator::PromptEvaluator;
use crate::instance::Instance;

/// Returns true when any word is a case-insensitive substring of `text`.
pub fn word_in_text(words: &[String], text: &str) -> bool {
    let text_lower = text.to_lowercase();
    words
        .iter()
        .any(|word| text_lower.contains(&word.to_lowercase()))
}

/// Returns the first word that matches `text`, in configured order.
pub fn find_word<'a>(words: &'a [String], text: &str) -> Option<&'a str> {
    let text_lower = text.to_lowercase();
    words
        .iter()
        .find(|word| text_lower.contains(&word.to_lowercase()))
        .map(String::as_str)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Why a message was dropped before any matching ran.
pub enum DropReason {
    IgnoreWords,
    NegativeWords,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IgnoreWords => "ignore_words",
            Self::NegativeWords => "negative_words",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Best prompt evidence seen during a scan.
pub struct PromptMatch {
    pub prompt_name: Option<String>,
    pub score: i64,
    pub quote: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Outcome of the layered match policy for one (instance, message) pair.
pub enum Decision {
    /// Ignore/negative filter fired; the message is not even counted.
    Dropped(DropReason),
    /// A trigger word matched; keyword matches always win over prompts.
    ForwardWord(String),
    /// A prompt crossed its own threshold. Carries the best evidence seen so
    /// far, which is not necessarily the prompt that crossed the line.
    ForwardPrompt(Option<PromptMatch>),
    /// Nothing matched; best evidence kept for observability.
    NoMatch(Option<PromptMatch>),
}

/// The layered decision engine: ignore/negative filters, then exact keyword
/// match, then ordered prompt evaluation with early exit.
#[derive(Clone)]
pub struct MatchPolicy {
    evaluator: PromptEvaluator,
}

impl MatchPolicy {
    pub fn new(evaluator: PromptEvaluator) -> Self {
        Self { evaluator }
    }

    pub fn evaluator(&self) -> &PromptEvaluator {
        &self.evaluator
    }

    pub async fn decide(
        &self,
        instance: &Instance,
        text: Option<&str>,
        chat_name: &str,
    ) -> Decision {
        let Some(text) = text.filter(|text| !text.is_empty()) else {
            return Decision::NoMatch(None);
        };

        if word_in_text(&instance.ignore_words, text) {
            return Decision::Dropped(DropReason::IgnoreWords);
        }
        if word_in_text(&instance.negative_words, text) {
            return Decision::Dropped(DropReason::NegativeWords);
        }
        if let Some(word) = find_word(&instance.words, text) {
            return Decision::ForwardWord(word.to_string());
        }

        let mut best_score = 0;
        let mut best: Option<PromptMatch> = None;
        for prompt in &instance.prompts {
            let result = self
                .evaluator
                .evaluate(prompt, text, &instance.name, chat_name)
                .await;
            if result.score > best_score {
                best_score = result.score;
                best = Some(PromptMatch {
                    prompt_name: prompt.name.clone(),
                    score: result.score,
                    quote: result.quote,
                    reasoning: result.reasoning,
                });
            }
            if result.score >= prompt.effective_threshold() {
                return Decision::ForwardPrompt(best);
            }
        }
        Decision::NoMatch(best)
    }
}
