use crate::error::{DecodeError, Result};
use crate::sampling::{softmax, top_k_token_ids};

/// Log-probability the model assigned to each row's chosen token, computed
/// over the entire vocabulary rather than any truncated candidate set.
///
/// `sampled_ids` carries one id per batch row; the batch size is its length.
/// Summing the negated results across a sequence gives its negative
/// log-likelihood. Rows for already-terminated streams still need a valid
/// padding id; discarding their result is the caller's business.
pub fn compute_log_likelihood(
    logits: &[f32],
    sampled_ids: &[u32],
    temperature: f32,
) -> Result<Vec<f32>> {
    if sampled_ids.is_empty() {
        return Err(DecodeError::invalid_arg("sampled ids cannot be empty"));
    }
    let batch_size = sampled_ids.len();
    if logits.len() % batch_size != 0 {
        return Err(DecodeError::invalid_arg(format!(
            "logits length must be a multiple of batch size, got {} and {}",
            logits.len(),
            batch_size
        )));
    }
    let vocab_size = logits.len() / batch_size;
    for &id in sampled_ids {
        if id as usize >= vocab_size {
            return Err(DecodeError::invalid_arg(format!("invalid sampled id: {id}")));
        }
    }

    // Candidate set is every vocabulary id, so each row of the probability
    // buffer is indexed directly by token id.
    let all_token_ids = top_k_token_ids(logits, vocab_size, batch_size)?;
    let (all_probabilities, _) = softmax(logits, &all_token_ids, temperature, batch_size)?;

    Ok(sampled_ids
        .iter()
        .enumerate()
        .map(|(b, &id)| all_probabilities[b * vocab_size + id as usize].ln())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn scores_full_vocabulary_probability() {
        let logits = [0.0, 0.0, 0.3];
        let confidence = compute_log_likelihood(&logits, &[2], 1.0).unwrap();
        let expected = (0.3f32.exp() / (2.0 + 0.3f32.exp())).ln();
        assert_relative_eq!(confidence[0], expected, epsilon = 1e-6);
    }

    #[test]
    fn scores_are_non_positive() {
        let logits = [1.5, -0.2, 0.7, 0.0, 3.0, -1.0];
        let confidence = compute_log_likelihood(&logits, &[0, 1], 0.9).unwrap();
        assert_eq!(confidence.len(), 2);
        for &c in &confidence {
            assert!(c <= 0.0);
        }
    }

    #[test]
    fn batch_rows_are_scored_independently() {
        // Two identical rows with uniform logits: every token has prob 0.5.
        let logits = [0.0, 0.0, 0.0, 0.0];
        let confidence = compute_log_likelihood(&logits, &[0, 1], 1.0).unwrap();
        assert_relative_eq!(confidence[0], 0.5f32.ln(), epsilon = 1e-6);
        assert_relative_eq!(confidence[1], 0.5f32.ln(), epsilon = 1e-6);
    }

    #[test]
    fn rejects_out_of_vocabulary_id() {
        let logits = [0.0, 0.0, 0.3];
        assert!(compute_log_likelihood(&logits, &[12], 1.0).is_err());
    }

    #[test]
    fn rejects_empty_ids_and_bad_shapes() {
        assert!(compute_log_likelihood(&[0.0, 0.1], &[], 1.0).is_err());
        assert!(compute_log_likelihood(&[0.0, 0.1, 0.2], &[0, 1], 1.0).is_err());
    }
}
