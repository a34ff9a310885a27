//! Property-based tests for the payload oracle and the loss channel.

use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use zeroloss_sim::oracle::{self, HEADER_LEN, PayloadHeader};
use zeroloss_sim::{LossChannel, LossRate, OracleError, Verdict};

// ─── Oracle ──────────────────────────────────────────────────────────────────

proptest! {
    /// Every generated payload verifies and reports its own header.
    #[test]
    fn generated_payload_verifies(id in any::<u32>(), len in HEADER_LEN..=1350usize) {
        let frame = oracle::generate(id, len).unwrap();
        prop_assert_eq!(frame.len(), len);
        prop_assert_eq!(
            oracle::verify(&frame),
            Ok(PayloadHeader { id, length: len as u32 })
        );
    }

    /// Any single flipped body byte is reported at exactly its offset.
    #[test]
    fn flipped_body_byte_is_located(
        id in any::<u32>(),
        len in (HEADER_LEN + 1)..=1350usize,
        pos in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let mut frame = oracle::generate(id, len).unwrap().to_vec();
        let offset = HEADER_LEN + pos.index(len - HEADER_LEN);
        let expected = frame[offset];
        frame[offset] ^= mask;
        prop_assert_eq!(
            oracle::verify(&frame),
            Err(OracleError::PayloadCorruption {
                id,
                offset,
                expected,
                actual: expected ^ mask,
            })
        );
    }

    /// A frame whose size disagrees with its length field is a length
    /// mismatch, never a corruption, even when the body is also damaged.
    #[test]
    fn size_disagreement_is_length_mismatch(
        id in any::<u32>(),
        len in (HEADER_LEN + 2)..=1350usize,
        cut in 1usize..64,
        extend in any::<bool>(),
    ) {
        let mut frame = oracle::generate(id, len).unwrap().to_vec();
        if extend {
            frame.extend(vec![0xAA; cut]);
        } else {
            frame.truncate(len.saturating_sub(cut).max(HEADER_LEN));
            if let Some(b) = frame.get_mut(HEADER_LEN) {
                *b ^= 0x01;
            }
        }
        let actual = frame.len();
        prop_assume!(actual != len);
        prop_assert_eq!(
            oracle::verify(&frame),
            Err(OracleError::LengthMismatch { id, declared: len as u32, actual })
        );
    }
}

// ─── Channel ─────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Observed drop rate tracks the configured rate for any seed.
    #[test]
    fn drop_rate_converges(seed in any::<u64>(), sixteenths in 0u8..=16) {
        let rate = LossRate::from_sixteenths(sixteenths).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut ch = LossChannel::new(rate);
        for _ in 0..100_000 {
            ch.maybe_deliver(b"frame", &mut rng);
        }
        let observed = ch.stats().drop_rate();
        prop_assert!(
            (observed - rate.probability()).abs() < 0.01,
            "observed {} for rate {}", observed, rate.probability()
        );
    }

    /// Identical seeds give identical verdict sequences.
    #[test]
    fn verdicts_are_reproducible(seed in any::<u64>()) {
        let verdicts = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut ch = LossChannel::new(LossRate::REFERENCE);
            (0..256).map(|_| ch.maybe_deliver(b"f", &mut rng)).collect::<Vec<Verdict>>()
        };
        prop_assert_eq!(verdicts(seed), verdicts(seed));
    }
}
