use std::ops::RangeInclusive;

use thiserror::Error;

use crate::models::{
    BatchInferenceRequest, InferenceMode, InferenceRequest, SamplingOverrides, ValidatedRequest,
};

pub const MAX_PROMPT_CHARS: usize = 2_000;
pub const MAX_BATCH_PROMPTS: usize = 100;
pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const MAX_HISTORY_LIMIT: usize = 100;

const TEMPERATURE_RANGE: RangeInclusive<f64> = 0.0..=2.0;
const MAX_TOKENS_RANGE: RangeInclusive<f64> = 1.0..=2_048.0;
const TOP_P_RANGE: RangeInclusive<f64> = 0.0..=1.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("prompt cannot be empty")]
    EmptyPrompt,
    #[error("prompt is {length} characters, maximum is {max}", max = MAX_PROMPT_CHARS)]
    PromptTooLong { length: usize },
    #[error("temperature must be between 0 and 2")]
    InvalidTemperature,
    #[error("max_tokens must be between 1 and 2048")]
    InvalidMaxTokens,
    #[error("top_p must be between 0 and 1")]
    InvalidTopP,
    #[error("mode must be one of client_side, server_side, hybrid (got {0:?})")]
    InvalidMode(String),
    #[error("top_k must be at least 1")]
    InvalidTopK,
    #[error("prompts must be a non-empty list")]
    BatchEmpty,
    #[error("batch has {count} prompts, maximum is {max}", max = MAX_BATCH_PROMPTS)]
    BatchTooLarge { count: usize },
    #[error("prompt {index}: {source}")]
    BatchItem {
        index: usize,
        #[source]
        source: Box<ValidationError>,
    },
    #[error("limit must be between 1 and {max}", max = MAX_HISTORY_LIMIT)]
    InvalidLimit,
    #[error("missing required field: {0}")]
    MissingParameter(&'static str),
}

impl ValidationError {
    /// Machine-readable code surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyPrompt => "EMPTY_PROMPT",
            Self::PromptTooLong { .. } => "PROMPT_TOO_LONG",
            Self::InvalidTemperature => "INVALID_TEMPERATURE",
            Self::InvalidMaxTokens => "INVALID_MAX_TOKENS",
            Self::InvalidTopP => "INVALID_TOP_P",
            Self::InvalidMode(_) => "INVALID_MODE",
            Self::InvalidTopK => "INVALID_TOP_K",
            Self::BatchEmpty => "BATCH_EMPTY",
            Self::BatchTooLarge { .. } => "BATCH_TOO_LARGE",
            Self::BatchItem { source, .. } => source.code(),
            Self::InvalidLimit => "INVALID_LIMIT",
            Self::MissingParameter(_) => "MISSING_PARAMETER",
        }
    }

    pub fn batch_index(&self) -> Option<usize> {
        match self {
            Self::BatchItem { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Pure request validation. Rules run in a fixed order; the first violation wins.
#[derive(Debug, Clone)]
pub struct RequestValidator {
    default_model: String,
    default_mode: InferenceMode,
}

impl RequestValidator {
    pub fn new(default_model: impl Into<String>, default_mode: InferenceMode) -> Self {
        Self {
            default_model: default_model.into(),
            default_mode,
        }
    }

    pub fn validate(&self, request: &InferenceRequest) -> Result<ValidatedRequest, ValidationError> {
        let prompt = request.prompt.as_deref().unwrap_or_default();
        if prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        let length = prompt.chars().count();
        if length > MAX_PROMPT_CHARS {
            return Err(ValidationError::PromptTooLong { length });
        }

        let temperature = check_temperature(request.temperature)?;
        let max_tokens = check_max_tokens(request.max_tokens)?;
        let top_p = check_top_p(request.top_p)?;
        let mode = match request.mode.as_deref() {
            None => self.default_mode,
            Some(value) => InferenceMode::parse(value)
                .ok_or_else(|| ValidationError::InvalidMode(value.to_owned()))?,
        };
        let top_k = check_top_k(request.top_k)?;

        let model_id = request
            .model_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.default_model)
            .to_owned();

        Ok(ValidatedRequest::new(
            prompt.to_owned(),
            model_id,
            mode,
            SamplingOverrides {
                temperature,
                max_tokens,
                top_p,
                top_k,
            },
        ))
    }

    /// Checks the batch size, then validates every prompt with the shared
    /// sampling fields. The first failing prompt rejects the whole batch.
    pub fn validate_batch(
        &self,
        request: &BatchInferenceRequest,
    ) -> Result<Vec<ValidatedRequest>, ValidationError> {
        let prompts = request.prompts.as_deref().unwrap_or_default();
        if prompts.is_empty() {
            return Err(ValidationError::BatchEmpty);
        }
        if prompts.len() > MAX_BATCH_PROMPTS {
            return Err(ValidationError::BatchTooLarge {
                count: prompts.len(),
            });
        }

        prompts
            .iter()
            .enumerate()
            .map(|(index, prompt)| {
                self.validate(&request.item(prompt))
                    .map_err(|source| ValidationError::BatchItem {
                        index,
                        source: Box::new(source),
                    })
            })
            .collect()
    }
}

/// Bounds check shared by per-model sampling configuration.
pub fn validate_sampling(
    temperature: Option<f64>,
    max_tokens: Option<f64>,
    top_p: Option<f64>,
    top_k: Option<f64>,
) -> Result<SamplingOverrides, ValidationError> {
    Ok(SamplingOverrides {
        temperature: check_temperature(temperature)?,
        max_tokens: check_max_tokens(max_tokens)?,
        top_p: check_top_p(top_p)?,
        top_k: check_top_k(top_k)?,
    })
}

pub fn validate_history_limit(limit: Option<i64>) -> Result<usize, ValidationError> {
    match limit {
        None => Ok(DEFAULT_HISTORY_LIMIT),
        Some(value) if (1..=MAX_HISTORY_LIMIT as i64).contains(&value) => Ok(value as usize),
        Some(_) => Err(ValidationError::InvalidLimit),
    }
}

fn check_temperature(value: Option<f64>) -> Result<Option<f64>, ValidationError> {
    match value {
        Some(v) if !TEMPERATURE_RANGE.contains(&v) => Err(ValidationError::InvalidTemperature),
        other => Ok(other),
    }
}

// JSON numbers arrive as f64; integer fields must carry no fractional part.
fn check_max_tokens(value: Option<f64>) -> Result<Option<u32>, ValidationError> {
    match value {
        None => Ok(None),
        Some(v) if v.fract() == 0.0 && MAX_TOKENS_RANGE.contains(&v) => Ok(Some(v as u32)),
        Some(_) => Err(ValidationError::InvalidMaxTokens),
    }
}

fn check_top_p(value: Option<f64>) -> Result<Option<f64>, ValidationError> {
    match value {
        Some(v) if !TOP_P_RANGE.contains(&v) => Err(ValidationError::InvalidTopP),
        other => Ok(other),
    }
}

fn check_top_k(value: Option<f64>) -> Result<Option<u32>, ValidationError> {
    match value {
        None => Ok(None),
        Some(v) if v.fract() == 0.0 && (1.0..=u32::MAX as f64).contains(&v) => Ok(Some(v as u32)),
        Some(_) => Err(ValidationError::InvalidTopK),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> RequestValidator {
        RequestValidator::new("default-model", InferenceMode::ClientSide)
    }

    fn prompt(text: &str) -> InferenceRequest {
        InferenceRequest {
            prompt: Some(text.to_owned()),
            ..InferenceRequest::default()
        }
    }

    #[test]
    fn accepts_prompts_up_to_the_limit() {
        for length in [1, 2, 500, MAX_PROMPT_CHARS] {
            let request = prompt(&"a".repeat(length));
            assert!(validator().validate(&request).is_ok(), "length {length}");
        }
    }

    #[test]
    fn rejects_empty_and_whitespace_prompts() {
        for text in ["", "   ", "\n\t"] {
            assert_eq!(
                validator().validate(&prompt(text)),
                Err(ValidationError::EmptyPrompt)
            );
        }
        assert_eq!(
            validator().validate(&InferenceRequest::default()),
            Err(ValidationError::EmptyPrompt)
        );
    }

    #[test]
    fn prompt_length_counts_characters_not_bytes() {
        let multibyte = "é".repeat(MAX_PROMPT_CHARS);
        assert!(validator().validate(&prompt(&multibyte)).is_ok());

        let error = validator()
            .validate(&prompt(&"a".repeat(MAX_PROMPT_CHARS + 1)))
            .expect_err("too long");
        assert_eq!(error.code(), "PROMPT_TOO_LONG");
    }

    #[test]
    fn temperature_boundaries() {
        for ok in [0.0, 1.0, 2.0] {
            let request = InferenceRequest {
                temperature: Some(ok),
                ..prompt("hi")
            };
            assert!(validator().validate(&request).is_ok(), "temperature {ok}");
        }
        for bad in [-0.01, 2.01, 100.0] {
            let request = InferenceRequest {
                temperature: Some(bad),
                ..prompt("hi")
            };
            assert_eq!(
                validator().validate(&request),
                Err(ValidationError::InvalidTemperature)
            );
        }
    }

    #[test]
    fn sampling_bounds_are_enforced() {
        let cases = [
            (
                InferenceRequest { max_tokens: Some(0.0), ..prompt("hi") },
                "INVALID_MAX_TOKENS",
            ),
            (
                InferenceRequest { max_tokens: Some(2_049.0), ..prompt("hi") },
                "INVALID_MAX_TOKENS",
            ),
            (
                InferenceRequest { top_p: Some(1.5), ..prompt("hi") },
                "INVALID_TOP_P",
            ),
            (
                InferenceRequest { top_k: Some(0.0), ..prompt("hi") },
                "INVALID_TOP_K",
            ),
            (
                InferenceRequest { mode: Some("gpu".to_owned()), ..prompt("hi") },
                "INVALID_MODE",
            ),
        ];

        for (request, code) in cases {
            let error = validator().validate(&request).expect_err(code);
            assert_eq!(error.code(), code);
        }
    }

    #[test]
    fn integer_fields_reject_fractions_and_huge_values() {
        for bad in [1.5, 4096.5, 1e20, -3.0] {
            let request = InferenceRequest {
                max_tokens: Some(bad),
                ..prompt("hi")
            };
            assert_eq!(
                validator().validate(&request),
                Err(ValidationError::InvalidMaxTokens),
                "max_tokens {bad}"
            );
        }
        for bad in [1.5, 0.5, 1e20] {
            let request = InferenceRequest {
                top_k: Some(bad),
                ..prompt("hi")
            };
            assert_eq!(
                validator().validate(&request),
                Err(ValidationError::InvalidTopK),
                "top_k {bad}"
            );
        }

        let request = InferenceRequest {
            max_tokens: Some(2_048.0),
            top_k: Some(40.0),
            ..prompt("hi")
        };
        let validated = validator().validate(&request).expect("valid");
        assert_eq!(validated.sampling().max_tokens, Some(2_048));
        assert_eq!(validated.sampling().top_k, Some(40));
    }

    #[test]
    fn first_violation_wins() {
        let request = InferenceRequest {
            prompt: Some(String::new()),
            temperature: Some(9.0),
            mode: Some("bogus".to_owned()),
            ..InferenceRequest::default()
        };
        assert_eq!(validator().validate(&request), Err(ValidationError::EmptyPrompt));

        let request = InferenceRequest {
            temperature: Some(9.0),
            max_tokens: Some(-1.0),
            ..prompt("hi")
        };
        assert_eq!(
            validator().validate(&request),
            Err(ValidationError::InvalidTemperature)
        );
    }

    #[test]
    fn fills_defaults_for_missing_fields() {
        let validated = validator().validate(&prompt("What is AI?")).expect("valid");
        assert_eq!(validated.model_id(), "default-model");
        assert_eq!(validated.mode(), InferenceMode::ClientSide);
        assert_eq!(validated.sampling(), &SamplingOverrides::default());

        let request = InferenceRequest {
            model_id: Some("phi".to_owned()),
            mode: Some("hybrid".to_owned()),
            max_tokens: Some(64.0),
            ..prompt("What is AI?")
        };
        let validated = validator().validate(&request).expect("valid");
        assert_eq!(validated.model_id(), "phi");
        assert_eq!(validated.mode(), InferenceMode::Hybrid);
        assert_eq!(validated.sampling().max_tokens, Some(64));
    }

    #[test]
    fn batch_size_bounds() {
        let batch = |count: usize| BatchInferenceRequest {
            prompts: Some(vec!["q".to_owned(); count]),
            ..BatchInferenceRequest::default()
        };

        assert_eq!(
            validator().validate_batch(&batch(0)),
            Err(ValidationError::BatchEmpty)
        );
        assert_eq!(
            validator().validate_batch(&BatchInferenceRequest::default()),
            Err(ValidationError::BatchEmpty)
        );
        assert_eq!(validator().validate_batch(&batch(1)).map(|v| v.len()), Ok(1));
        assert_eq!(validator().validate_batch(&batch(100)).map(|v| v.len()), Ok(100));
        assert_eq!(
            validator().validate_batch(&batch(101)),
            Err(ValidationError::BatchTooLarge { count: 101 })
        );
    }

    #[test]
    fn batch_items_are_revalidated_individually() {
        let request = BatchInferenceRequest {
            prompts: Some(vec!["a".to_owned(), " ".to_owned(), "c".to_owned()]),
            ..BatchInferenceRequest::default()
        };

        let error = validator().validate_batch(&request).expect_err("blank item");
        assert_eq!(error.code(), "EMPTY_PROMPT");
        assert_eq!(error.batch_index(), Some(1));
    }

    #[test]
    fn history_limit_bounds() {
        assert_eq!(validate_history_limit(None), Ok(DEFAULT_HISTORY_LIMIT));
        assert_eq!(validate_history_limit(Some(1)), Ok(1));
        assert_eq!(validate_history_limit(Some(100)), Ok(100));
        assert_eq!(validate_history_limit(Some(0)), Err(ValidationError::InvalidLimit));
        assert_eq!(validate_history_limit(Some(101)), Err(ValidationError::InvalidLimit));
    }
}
