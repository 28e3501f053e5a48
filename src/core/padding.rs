//! Batch padding.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::encoding::Encoding;
use super::tokenizer::TokenizerError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaddingStrategy {
    /// Pad to the longest encoding of the batch.
    #[default]
    BatchLongest,
    Fixed(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaddingDirection {
    Left,
    #[default]
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaddingParams {
    #[serde(default)]
    pub strategy: PaddingStrategy,
    #[serde(default)]
    pub direction: PaddingDirection,
    #[serde(default)]
    pub pad_to_multiple_of: Option<usize>,
    #[serde(default)]
    pub pad_id: u32,
    #[serde(default)]
    pub pad_type_id: u32,
    #[serde(default = "default_pad_token")]
    pub pad_token: String,
}

fn default_pad_token() -> String {
    "[PAD]".to_owned()
}

impl Default for PaddingParams {
    fn default() -> Self {
        Self {
            strategy: PaddingStrategy::default(),
            direction: PaddingDirection::default(),
            pad_to_multiple_of: None,
            pad_id: 0,
            pad_type_id: 0,
            pad_token: default_pad_token(),
        }
    }
}

impl PaddingParams {
    pub fn with_strategy(mut self, strategy: PaddingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_direction(mut self, direction: PaddingDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_pad_to_multiple_of(mut self, multiple: usize) -> Self {
        self.pad_to_multiple_of = Some(multiple);
        self
    }

    pub fn with_pad_token(mut self, pad_token: impl Into<String>, pad_id: u32) -> Self {
        self.pad_token = pad_token.into();
        self.pad_id = pad_id;
        self
    }

    pub fn with_pad_type_id(mut self, pad_type_id: u32) -> Self {
        self.pad_type_id = pad_type_id;
        self
    }

    /// Length every encoding of `encodings` is padded to.
    pub fn target_length(&self, encodings: &[Encoding]) -> Result<usize, TokenizerError> {
        let base = match self.strategy {
            PaddingStrategy::Fixed(len) => len,
            PaddingStrategy::BatchLongest => encodings.iter().map(Encoding::len).max().unwrap_or(0),
        };
        match self.pad_to_multiple_of {
            None => Ok(base),
            Some(0) => Err(TokenizerError::Configuration(
                "pad_to_multiple_of must be greater than zero".into(),
            )),
            Some(multiple) => Ok(base.div_ceil(multiple) * multiple),
        }
    }
}

/// Pad every encoding (and its overflowing windows) to a common length.
pub fn pad_encodings(encodings: &mut [Encoding], params: &PaddingParams) -> Result<(), TokenizerError> {
    if encodings.is_empty() {
        return Ok(());
    }
    let target = params.target_length(encodings)?;
    encodings.par_iter_mut().for_each(|encoding| {
        encoding.pad(
            target,
            params.pad_id,
            params.pad_type_id,
            &params.pad_token,
            params.direction,
        )
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoding::Token;

    fn seq(n: u32) -> Encoding {
        Encoding::from_tokens(
            (0..n).map(|i| Token::new(i + 1, i.to_string(), (0, 0))).collect(),
        )
    }

    #[test]
    fn test_batch_longest() {
        let mut batch = vec![seq(3), seq(5)];
        pad_encodings(&mut batch, &PaddingParams::default()).unwrap();
        assert_eq!(batch[0].len(), 5);
        assert_eq!(batch[1].len(), 5);
        assert_eq!(batch[0].get_ids(), &[1, 2, 3, 0, 0]);
        assert_eq!(batch[0].get_attention_mask(), &[1, 1, 1, 0, 0]);
        assert_eq!(batch[1].get_attention_mask(), &[1; 5]);
    }

    #[test]
    fn test_fixed_with_multiple() {
        let mut batch = vec![seq(2)];
        let params = PaddingParams::default()
            .with_strategy(PaddingStrategy::Fixed(5))
            .with_pad_to_multiple_of(4)
            .with_direction(PaddingDirection::Left);
        pad_encodings(&mut batch, &params).unwrap();
        assert_eq!(batch[0].len(), 8);
        assert_eq!(batch[0].get_ids()[6..], [1, 2]);
    }

    #[test]
    fn test_idempotent() {
        let mut batch = vec![seq(1), seq(4)];
        let params = PaddingParams::default().with_pad_to_multiple_of(3);
        pad_encodings(&mut batch, &params).unwrap();
        let once = batch.clone();
        pad_encodings(&mut batch, &params).unwrap();
        assert_eq!(batch, once);
        assert_eq!(batch[0].len(), 6);
    }

    #[test]
    fn test_zero_multiple_rejected() {
        let mut batch = vec![seq(1)];
        let params = PaddingParams::default().with_pad_to_multiple_of(0);
        assert!(matches!(
            pad_encodings(&mut batch, &params),
            Err(TokenizerError::Configuration(_))
        ));
    }

    #[test]
    fn test_params_deserialize() {
        let json = r#"{"strategy":{"Fixed":16},"direction":"Left","pad_to_multiple_of":null,
            "pad_id":3,"pad_type_id":0,"pad_token":"<pad>"}"#;
        let params: PaddingParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.strategy, PaddingStrategy::Fixed(16));
        assert_eq!(params.direction, PaddingDirection::Left);
        assert_eq!(params.pad_token, "<pad>");
    }
}
