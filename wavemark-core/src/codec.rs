use crate::message::DATA_BITS;

/// Code rate: 1/2 (each input bit produces 2 output bits).
pub const CODE_RATE_INV: usize = 2;
/// Constraint length K=7, meaning 64 states.
pub const CONSTRAINT_LENGTH: usize = 7;
/// Number of states in the trellis (2^(K-1)).
pub const NUM_STATES: usize = 1 << (CONSTRAINT_LENGTH - 1);
/// Zero bits flushed after the data so the trellis ends in state 0.
pub const TAIL_BITS: usize = CONSTRAINT_LENGTH - 1;
/// Total coded bits per block.
pub const CODED_BITS: usize = (DATA_BITS + TAIL_BITS) * CODE_RATE_INV;

/// Generator polynomials (octal 171, 133), the NASA standard pair.
const GENERATORS: [u8; CODE_RATE_INV] = [0o171, 0o133];

fn outputs(state: usize, input_bit: u8) -> [bool; CODE_RATE_INV] {
    let reg = (input_bit << (CONSTRAINT_LENGTH - 1)) | state as u8;
    GENERATORS.map(|poly| (reg & poly).count_ones() % 2 == 1)
}

fn next_state(state: usize, input_bit: u8) -> usize {
    ((input_bit as usize) << (CONSTRAINT_LENGTH - 2)) | (state >> 1)
}

/// Convolutional encoder (rate 1/2, K=7), terminated with [`TAIL_BITS`] zeros.
pub fn encode(input_bits: &[bool]) -> Vec<bool> {
    let mut output = Vec::with_capacity((input_bits.len() + TAIL_BITS) * CODE_RATE_INV);
    let mut state = 0usize;

    for &bit in input_bits.iter().chain([false; TAIL_BITS].iter()) {
        let input_val = bit as u8;
        output.extend(outputs(state, input_val));
        state = next_state(state, input_val);
    }

    output
}

/// Soft-decision Viterbi decoder for [`encode`]'s output.
///
/// `soft_bits` contains soft values where positive = more likely 1, negative
/// = more likely 0; the magnitude indicates confidence. Returns the data
/// bits with the tail removed.
pub fn decode(soft_bits: &[f32]) -> Vec<bool> {
    let steps = soft_bits.len() / CODE_RATE_INV;
    if steps <= TAIL_BITS {
        return Vec::new();
    }

    let mut path_metric = vec![f32::NEG_INFINITY; NUM_STATES];
    path_metric[0] = 0.0;
    let mut survivors = vec![[0u8; NUM_STATES]; steps];

    let expected: Vec<[[bool; CODE_RATE_INV]; 2]> = (0..NUM_STATES)
        .map(|state| [outputs(state, 0), outputs(state, 1)])
        .collect();

    for (t, soft_slice) in soft_bits.chunks_exact(CODE_RATE_INV).enumerate() {
        let mut new_metric = [f32::NEG_INFINITY; NUM_STATES];
        // Tail steps only carry zeros
        let inputs: &[u8] = if t >= steps - TAIL_BITS { &[0] } else { &[0, 1] };

        for state in 0..NUM_STATES {
            if path_metric[state] == f32::NEG_INFINITY {
                continue;
            }
            for &input_bit in inputs {
                let branch_metric: f32 = expected[state][input_bit as usize]
                    .iter()
                    .zip(soft_slice)
                    .map(|(&e, &soft)| if e { soft } else { -soft })
                    .sum();

                let next = next_state(state, input_bit);
                let candidate = path_metric[state] + branch_metric;
                if candidate > new_metric[next] {
                    new_metric[next] = candidate;
                    survivors[t][next] = state as u8;
                }
            }
        }

        path_metric.copy_from_slice(&new_metric);
    }

    // Terminated code: trace back from state 0
    let mut decoded = vec![false; steps];
    let mut state = 0usize;
    for t in (0..steps).rev() {
        decoded[t] = (state >> (CONSTRAINT_LENGTH - 2)) & 1 == 1;
        state = survivors[t][state] as usize;
    }

    decoded.truncate(steps - TAIL_BITS);
    decoded
}

/// Per-input-bit agreement between soft values and the re-encoded decision.
///
/// For each decoded bit, the soft values of the code symbols it emitted are
/// compared against the symbols `decoded` implies; the result is in
/// `[-1, 1]`, with 1 meaning every symbol agreed with full weight.
pub fn bit_confidence(decoded: &[bool], soft_bits: &[f32]) -> Vec<f32> {
    let coded = encode(decoded);
    coded
        .chunks_exact(CODE_RATE_INV)
        .zip(soft_bits.chunks_exact(CODE_RATE_INV))
        .take(decoded.len())
        .map(|(expected, soft)| {
            let total: f32 = soft.iter().map(|s| s.abs()).sum();
            if total <= f32::EPSILON {
                return 0.0;
            }
            let agree: f32 = expected
                .iter()
                .zip(soft)
                .map(|(&e, &s)| if e { s } else { -s })
                .sum();
            agree / total
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_soft(coded: &[bool]) -> Vec<f32> {
        coded.iter().map(|&b| if b { 1.0 } else { -1.0 }).collect()
    }

    #[test]
    fn encode_decode_round_trip() {
        let input: Vec<bool> = (0..DATA_BITS).map(|i| (i * 7 + 3) % 3 == 0).collect();

        let coded = encode(&input);
        assert_eq!(coded.len(), CODED_BITS);

        let decoded = decode(&to_soft(&coded));
        assert_eq!(decoded, input);
    }

    #[test]
    fn decode_with_weak_symbols() {
        let input: Vec<bool> = (0..DATA_BITS).map(|i| (i * 13 + 5) % 2 == 0).collect();
        let mut soft = to_soft(&encode(&input));

        for i in (0..soft.len()).step_by(5) {
            soft[i] *= 0.1;
        }

        assert_eq!(decode(&soft), input);
    }

    #[test]
    fn decode_with_bit_errors() {
        let input: Vec<bool> = (0..DATA_BITS).map(|i| (i * 11 + 2) % 3 == 0).collect();
        let mut soft = to_soft(&encode(&input));

        // Isolated hard errors, well inside the free distance (10)
        for i in (0..soft.len()).step_by(40) {
            soft[i] = -soft[i];
        }

        let decoded = decode(&soft);
        let errors = decoded.iter().zip(&input).filter(|(a, b)| a != b).count();
        assert_eq!(errors, 0, "had {errors} errors after decoding");
    }

    #[test]
    fn tail_returns_to_zero_state() {
        let coded = encode(&[true; 20]);
        assert_eq!(coded.len(), (20 + TAIL_BITS) * CODE_RATE_INV);
        // Last output pair only sees the final input bit in the register
        let last = &coded[coded.len() - 2..];
        assert_eq!(last, &[true, true]);
    }

    #[test]
    fn all_zeros_and_ones() {
        for value in [false, true] {
            let input = vec![value; DATA_BITS];
            assert_eq!(decode(&to_soft(&encode(&input))), input);
        }
    }

    #[test]
    fn confidence_tracks_agreement() {
        let input: Vec<bool> = (0..DATA_BITS).map(|i| i % 5 == 0).collect();
        let mut soft = to_soft(&encode(&input));
        let clean = bit_confidence(&input, &soft);
        assert!(clean.iter().all(|&c| (c - 1.0).abs() < 1e-6));

        soft[0] = -soft[0];
        let noisy = bit_confidence(&input, &soft);
        assert_eq!(noisy[0], 0.0);
        assert_eq!(noisy.len(), DATA_BITS);
    }

    #[test]
    fn too_short_decodes_empty() {
        assert!(decode(&[1.0; 4]).is_empty());
    }
}
