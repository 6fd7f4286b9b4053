use crate::error::{DecodeError, Result};

/// Trims the leading tokens of `input_ids` that are already covered by the
/// session's processed history, and advances the cache cursor past them.
///
/// `processed_tokens` is the session's full history, `time_step` the number of
/// tokens already committed to reusable computation state. The longest common
/// prefix of `input_ids` and `processed_tokens[*time_step..]` is removed from
/// the front of `input_ids` and added to `*time_step`, so the caller only
/// feeds genuinely new tokens to the executor. Applying this twice with an
/// unchanged history is a no-op.
pub fn remove_matching_tokens(
    processed_tokens: &[u32],
    input_ids: &mut Vec<u32>,
    time_step: &mut usize,
) -> Result<()> {
    if *time_step > processed_tokens.len() {
        return Err(DecodeError::FailedPrecondition(format!(
            "time step {} exceeds the processed token count {}",
            *time_step,
            processed_tokens.len()
        )));
    }

    let matching_tokens = input_ids
        .iter()
        .zip(&processed_tokens[*time_step..])
        .take_while(|(input, processed)| input == processed)
        .count();

    input_ids.drain(..matching_tokens);
    *time_step += matching_tokens;
    Ok(())
}
