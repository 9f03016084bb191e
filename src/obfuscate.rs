//! Obfuscation helpers used by the passthrough path.

use rand::Rng;

const ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// `n` characters drawn uniformly from the 52-letter ASCII alphabet.
pub fn random_token(n: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| ALPHA[rng.gen_range(0..ALPHA.len())] as char)
        .collect()
}

/// Yields consecutive non-empty slices of `bytes` whose lengths are chosen
/// uniformly from `[1, step-1]`, covering the entire input. Used with
/// `step = 6` to fragment the Host line across several TCP segments.
pub fn random_split(bytes: &[u8], step: usize) -> Vec<Vec<u8>> {
    assert!(step > 1, "step must allow at least a 1-byte segment");
    let mut rng = rand::thread_rng();
    let mut out = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        let want = rng.gen_range(1..step).min(rest.len());
        let (head, tail) = rest.split_at(want);
        out.push(head.to_vec());
        rest = tail;
    }
    out
}

/// Draws a sleep duration uniformly from `[0, 9]` ms. 0 is a valid outcome.
pub fn random_delay_ms() -> u64 {
    rand::thread_rng().gen_range(0..10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_token_has_requested_length_and_alphabet() {
        let tok = random_token(128);
        assert_eq!(tok.len(), 128);
        assert!(tok.chars().all(|c| c.is_ascii_alphabetic()));
    }

    #[test]
    fn random_split_covers_whole_input_with_bounded_segments() {
        let data = b"hostname.example.com".to_vec();
        let pieces = random_split(&data, 6);
        assert!(!pieces.is_empty());
        for p in &pieces {
            assert!(!p.is_empty());
            assert!(p.len() <= 5);
        }
        let joined: Vec<u8> = pieces.into_iter().flatten().collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn random_split_single_byte_step_bound() {
        // step=6 means segments in [1,5]; run many times to exercise the range.
        for _ in 0..200 {
            let pieces = random_split(b"abcdefghij", 6);
            for p in &pieces {
                assert!((1..=5).contains(&p.len()));
            }
        }
    }

    #[test]
    fn random_delay_is_within_0_to_9_ms() {
        for _ in 0..500 {
            let d = random_delay_ms();
            assert!(d <= 9);
        }
    }
}
