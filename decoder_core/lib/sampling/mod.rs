use crate::error::{DecodeError, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Validates the `[batch_size, vocab_size]` shape of a flat logits buffer and
/// returns the vocabulary size.
fn checked_vocab_size(logits: &[f32], batch_size: usize) -> Result<usize> {
    if logits.is_empty() {
        return Err(DecodeError::invalid_arg("logits buffer cannot be empty"));
    }
    if batch_size == 0 {
        return Err(DecodeError::invalid_arg("batch size must be greater than 0"));
    }
    if logits.len() % batch_size != 0 {
        return Err(DecodeError::invalid_arg(format!(
            "logits length must be a multiple of batch size, got {} and {}",
            logits.len(),
            batch_size
        )));
    }
    Ok(logits.len() / batch_size)
}

/// Index of the largest value in `row`; ties go to the first occurrence.
fn argmax_first(row: &[f32]) -> usize {
    let mut best = 0;
    for (idx, &value) in row.iter().enumerate().skip(1) {
        if value > row[best] {
            best = idx;
        }
    }
    best
}

/// Returns the token ids of the `k` largest logits per batch row, as a flat
/// `[batch_size, k]` buffer.
///
/// For `k == 1` each row holds the argmax (first occurrence on ties). For
/// larger `k` the first k slots of each row are the k largest ids in
/// unspecified relative order; callers needing ranked order must sort.
pub fn top_k_token_ids(logits: &[f32], k: usize, batch_size: usize) -> Result<Vec<u32>> {
    let vocab_size = checked_vocab_size(logits, batch_size)?;
    if k == 0 {
        return Err(DecodeError::invalid_arg("k must be greater than 0"));
    }
    if k > vocab_size {
        return Err(DecodeError::invalid_arg(format!(
            "k must not exceed the vocabulary size, got {k} and {vocab_size}"
        )));
    }

    let mut output = Vec::with_capacity(batch_size * k);
    if k == 1 {
        for row in logits.chunks_exact(vocab_size) {
            output.push(argmax_first(row) as u32);
        }
    } else if k == vocab_size {
        // Every id qualifies; each row is the identity permutation.
        for _ in 0..batch_size {
            output.extend(0..vocab_size as u32);
        }
    } else {
        let mut indices: Vec<usize> = (0..vocab_size).collect();
        for row in logits.chunks_exact(vocab_size) {
            for (i, slot) in indices.iter_mut().enumerate() {
                *slot = i;
            }
            // Average linear-time partition; no full sort.
            indices.select_nth_unstable_by(k, |&a, &b| row[b].total_cmp(&row[a]));
            output.extend(indices[..k].iter().map(|&i| i as u32));
        }
    }
    Ok(output)
}

/// How a row's exponential mass gets turned into probabilities.
enum RowNorm {
    Normalized(f32),
    Uniform,
    OneHot,
}

fn resolve_row_norm(sum_of_exps: f32) -> RowNorm {
    if sum_of_exps <= f32::EPSILON {
        // All candidates underflowed relative to the row maximum.
        RowNorm::Uniform
    } else if sum_of_exps.is_infinite() {
        RowNorm::OneHot
    } else {
        RowNorm::Normalized(1.0 / sum_of_exps)
    }
}

/// Temperature-scaled softmax over the candidate ids of each batch row.
///
/// Returns the `[batch_size, k]` probabilities plus each row's maximum raw
/// logit value (over the candidates). Temperature `0` is clamped to
/// `f32::EPSILON` so it behaves as greedy instead of dividing by zero.
pub fn softmax(
    logits: &[f32],
    candidate_ids: &[u32],
    temperature: f32,
    batch_size: usize,
) -> Result<(Vec<f32>, Vec<f32>)> {
    let vocab_size = checked_vocab_size(logits, batch_size)?;
    if temperature < 0.0 {
        return Err(DecodeError::invalid_arg(format!(
            "temperature must be >= 0, got {temperature}"
        )));
    }
    if candidate_ids.is_empty() || candidate_ids.len() % batch_size != 0 {
        return Err(DecodeError::invalid_arg(format!(
            "candidate ids length must be a non-zero multiple of batch size, got {} and {}",
            candidate_ids.len(),
            batch_size
        )));
    }
    if let Some(&id) = candidate_ids.iter().find(|&&id| id as usize >= vocab_size) {
        return Err(DecodeError::invalid_arg(format!(
            "candidate id {id} is outside the vocabulary of size {vocab_size}"
        )));
    }

    let k = candidate_ids.len() / batch_size;
    let effective_temp = temperature.max(f32::EPSILON);
    let mut probabilities = vec![0f32; candidate_ids.len()];
    let mut max_logit_values = Vec::with_capacity(batch_size);

    for b in 0..batch_size {
        let row_logits = &logits[b * vocab_size..(b + 1) * vocab_size];
        let row_ids = &candidate_ids[b * k..(b + 1) * k];
        let row_probs = &mut probabilities[b * k..(b + 1) * k];

        // First-occurring maximum candidate; the one-hot fallback and the
        // sampler's degenerate-mass path both key off this slot.
        let mut max_slot = 0;
        for (slot, &id) in row_ids.iter().enumerate().skip(1) {
            if row_logits[id as usize] > row_logits[row_ids[max_slot] as usize] {
                max_slot = slot;
            }
        }
        let max_logit = row_logits[row_ids[max_slot] as usize];
        max_logit_values.push(max_logit);

        let mut sum_of_exps = 0f32;
        for (slot, &id) in row_ids.iter().enumerate() {
            let e = ((row_logits[id as usize] - max_logit) / effective_temp).exp();
            row_probs[slot] = e;
            sum_of_exps += e;
        }

        match resolve_row_norm(sum_of_exps) {
            RowNorm::Normalized(inv_sum) => {
                for prob in row_probs.iter_mut() {
                    *prob *= inv_sum;
                }
            }
            RowNorm::Uniform => {
                debug!(batch_row = b, "softmax mass underflowed, using uniform fallback");
                row_probs.fill(1.0 / k as f32);
            }
            RowNorm::OneHot => {
                debug!(batch_row = b, "softmax mass overflowed, using one-hot fallback");
                row_probs.fill(0.0);
                row_probs[max_slot] = 1.0;
            }
        }
    }
    Ok((probabilities, max_logit_values))
}

/// Outcome of one row's nucleus truncation and draw.
enum NucleusDraw {
    /// A token slot was drawn; `prob` is its un-renormalized probability over
    /// the full top-k set.
    Sampled { slot: usize, prob: f32 },
    /// The eligible set carried no usable mass; take the top slot without
    /// consuming randomness.
    DegenerateMass { slot: usize },
}

/// Sorts a row's top-k probabilities descending (stable, so ties keep their
/// top-k discovery order), truncates to the smallest prefix whose cumulative
/// probability reaches `p`, and draws one slot from that prefix.
fn nucleus_draw<R: Rng>(rng: &mut R, row_probs: &[f32], p: f64) -> NucleusDraw {
    let mut order: Vec<usize> = (0..row_probs.len()).collect();
    order.sort_by(|&a, &b| row_probs[b].total_cmp(&row_probs[a]));

    let mut cumulative = 0f64;
    let mut eligible = 0usize;
    for &slot in &order {
        cumulative += row_probs[slot] as f64;
        eligible += 1;
        if cumulative >= p {
            break;
        }
    }

    if cumulative <= f64::EPSILON {
        return NucleusDraw::DegenerateMass { slot: order[0] };
    }

    let drawn = rng.gen_range(0.0..cumulative);
    let mut running = 0f64;
    for &slot in &order[..eligible] {
        running += row_probs[slot] as f64;
        if drawn <= running {
            return NucleusDraw::Sampled { slot, prob: row_probs[slot] };
        }
    }
    // `drawn < cumulative` and `running` ends exactly at `cumulative`, so the
    // loop always selects; this keeps the row populated regardless.
    let last = order[eligible - 1];
    NucleusDraw::Sampled { slot: last, prob: row_probs[last] }
}

/// Draws one token per batch row with combined top-k and top-p truncation.
///
/// Returns `(sampled_ids, sampled_scores)`. Scores are the probability of the
/// drawn token over the top-k set (not renormalized over the nucleus); with
/// `k == 1` the path short-circuits to greedy argmax with scores of `1.0` and
/// leaves the random source untouched. Otherwise the random source advances
/// exactly once per row, in row order, so results are reproducible for a
/// fixed seed and batch layout.
pub fn top_k_top_p_sampling<R: Rng>(
    logits: &[f32],
    k: usize,
    p: f32,
    temperature: f32,
    rng: &mut R,
    batch_size: usize,
) -> Result<(Vec<u32>, Vec<f32>)> {
    let vocab_size = checked_vocab_size(logits, batch_size)?;
    if k == 0 {
        return Err(DecodeError::invalid_arg("k must be greater than 0"));
    }
    if !(0.0..=1.0).contains(&p) {
        return Err(DecodeError::invalid_arg(format!(
            "p must be in the range [0.0, 1.0], got {p}"
        )));
    }
    let k = k.min(vocab_size);

    let topk_token_ids = top_k_token_ids(logits, k, batch_size)?;
    let (probabilities, max_logit_values) =
        softmax(logits, &topk_token_ids, temperature, batch_size)?;

    if k == 1 {
        // Greedy decoding: exactly the argmax ids, no draw.
        return Ok((topk_token_ids, vec![1.0; batch_size]));
    }

    let effective_temp = temperature.max(f32::EPSILON);
    let mut sampled_ids = Vec::with_capacity(batch_size);
    let mut sampled_scores = Vec::with_capacity(batch_size);
    for b in 0..batch_size {
        let row_ids = &topk_token_ids[b * k..(b + 1) * k];
        let row_probs = &probabilities[b * k..(b + 1) * k];
        match nucleus_draw(rng, row_probs, p as f64) {
            NucleusDraw::Sampled { slot, prob } => {
                sampled_ids.push(row_ids[slot]);
                sampled_scores.push(prob);
            }
            NucleusDraw::DegenerateMass { slot } => {
                debug!(batch_row = b, "nucleus mass degenerate, taking argmax without a draw");
                let id = row_ids[slot];
                sampled_ids.push(id);
                let logit = logits[b * vocab_size + id as usize];
                sampled_scores.push(((logit - max_logit_values[b]) / effective_temp).exp());
            }
        }
    }
    Ok((sampled_ids, sampled_scores))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SamplingArgs {
    pub temp: f32,
    pub top_p: f32,
    pub top_k: usize,
}

/// Seeded sampler holding the random stream threaded across decode steps.
pub struct BatchedSampler {
    rng: StdRng,
    args: SamplingArgs,
}

impl BatchedSampler {
    pub fn new(seed: u64, args: SamplingArgs) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            args,
        }
    }

    /// One decode step over the batch.
    pub fn sample(&mut self, logits: &[f32], batch_size: usize) -> Result<(Vec<u32>, Vec<f32>)> {
        top_k_top_p_sampling(
            logits,
            self.args.top_k,
            self.args.top_p,
            self.args.temp,
            &mut self.rng,
            batch_size,
        )
    }
}
