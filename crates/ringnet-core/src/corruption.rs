//! Transmission error simulation.
//!
//! A fresh send may have one character replaced by its successor modulo 128
//! at a uniformly random position. The checksum in the frame still covers
//! the original payload, so the destination detects the change.

use crate::env::Environment;

/// Corrupt `payload` with the given probability.
///
/// Returns `None` when the payload is sent unchanged, including when it is
/// empty.
pub fn maybe_corrupt(payload: &str, probability: f64, env: &impl Environment) -> Option<String> {
    if payload.is_empty() || probability <= 0.0 {
        return None;
    }
    if probability < 1.0 && env.random_unit() >= probability {
        return None;
    }
    Some(corrupt(payload, env))
}

/// Replace one uniformly chosen character `c` with `(c + 1) mod 128`.
pub fn corrupt(payload: &str, env: &impl Environment) -> String {
    let count = payload.chars().count();
    if count == 0 {
        return String::new();
    }

    let index = env.random_below(count as u64) as usize;
    payload
        .chars()
        .enumerate()
        .map(|(position, c)| if position == index { flip(c) } else { c })
        .collect()
}

fn flip(c: char) -> char {
    char::from(((u32::from(c) + 1) % 128) as u8)
}

#[cfg(test)]
mod tests {
    use ringnet_proto::checksum;

    use super::*;
    use crate::test_support::TestEnv;

    #[test]
    fn changes_exactly_one_character() {
        let env = TestEnv::with_seed(1);
        let original = "hello ring";
        for _ in 0..50 {
            let corrupted = corrupt(original, &env);
            let differing =
                original.chars().zip(corrupted.chars()).filter(|(a, b)| a != b).count();
            assert_eq!(differing, 1);
            assert_eq!(corrupted.chars().count(), original.chars().count());
            assert!(!checksum::verify(&corrupted, checksum::crc32(original)));
        }
    }

    #[test]
    fn wraps_at_ascii_boundary() {
        assert_eq!(flip('a'), 'b');
        assert_eq!(flip('\u{7f}'), '\0');
        assert_eq!(flip('é'), 'j');
    }

    #[test]
    fn probability_bounds() {
        let env = TestEnv::with_seed(2);
        assert!(maybe_corrupt("abc", 0.0, &env).is_none());
        assert!(maybe_corrupt("abc", 1.0, &env).is_some());
        assert!(maybe_corrupt("", 1.0, &env).is_none());
    }
}
