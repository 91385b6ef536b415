//! Privacy score
//!
//! Deterministic, integer-only, and monotonic in every factor: raising one
//! factor while holding the rest fixed never lowers the score.
//!
//! ```text
//! anonymity set   40 pts   2 per bit of log2(set), capped at 20 bits
//! idle time       20 pts   linear up to one week since last use
//! counterparties  20 pts   2 per distinct counterparty, capped at 10
//! mixing rounds   20 pts   4 per round, capped at 5
//! ```

use serde::{Deserialize, Serialize};

pub const MAX_SCORE: u8 = 100;

const ANONYMITY_BITS_CAP: u32 = 20;
const ANONYMITY_POINTS_PER_BIT: u32 = 2;
const IDLE_CAP_SECS: u64 = 7 * 24 * 60 * 60;
const IDLE_POINTS: u64 = 20;
const COUNTERPARTY_CAP: u32 = 10;
const COUNTERPARTY_POINTS: u32 = 2;
const MIXING_CAP: u32 = 5;
const MIXING_POINTS: u32 = 4;

/// Inputs to the privacy score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyFactors {
    /// Commitments in the pool when the note/alias was created
    pub anonymity_set: u64,
    /// Seconds since the note/alias was last used
    pub elapsed_secs: u64,
    pub counterparties: u32,
    pub mixing_rounds: u32,
}

/// Score in `[0, 100]`
pub fn score(factors: &PrivacyFactors) -> u8 {
    // bit length, i.e. floor(log2(n)) + 1 for n > 0
    let bits = u64::BITS - factors.anonymity_set.leading_zeros();
    let anonymity = bits.min(ANONYMITY_BITS_CAP) * ANONYMITY_POINTS_PER_BIT;

    let idle = factors.elapsed_secs.min(IDLE_CAP_SECS) * IDLE_POINTS / IDLE_CAP_SECS;

    let counterparties = factors.counterparties.min(COUNTERPARTY_CAP) * COUNTERPARTY_POINTS;
    let mixing = factors.mixing_rounds.min(MIXING_CAP) * MIXING_POINTS;

    let total = u64::from(anonymity + counterparties + mixing) + idle;
    u8::try_from(total.min(u64::from(MAX_SCORE))).unwrap_or(MAX_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Vec<PrivacyFactors> {
        let sets = [0u64, 1, 2, 7, 1_000, 1 << 20, u64::MAX];
        let idles = [0u64, 59, 3_600, IDLE_CAP_SECS / 2, IDLE_CAP_SECS, u64::MAX];
        let counts = [0u32, 1, 3, 10, 50];
        let mut out = Vec::new();
        for &anonymity_set in &sets {
            for &elapsed_secs in &idles {
                for &counterparties in &counts {
                    for &mixing_rounds in &counts {
                        out.push(PrivacyFactors {
                            anonymity_set,
                            elapsed_secs,
                            counterparties,
                            mixing_rounds,
                        });
                    }
                }
            }
        }
        out
    }

    #[test]
    fn test_bounds() {
        assert_eq!(score(&PrivacyFactors::default()), 0);
        let max = PrivacyFactors {
            anonymity_set: u64::MAX,
            elapsed_secs: u64::MAX,
            counterparties: u32::MAX,
            mixing_rounds: u32::MAX,
        };
        assert_eq!(score(&max), MAX_SCORE);
    }

    #[test]
    fn test_deterministic() {
        let f = PrivacyFactors {
            anonymity_set: 4096,
            elapsed_secs: 86_400,
            counterparties: 3,
            mixing_rounds: 2,
        };
        assert_eq!(score(&f), score(&f));
    }

    #[test]
    fn test_monotonic_in_each_factor() {
        for f in grid() {
            let base = score(&f);
            let bumps = [
                PrivacyFactors {
                    anonymity_set: f.anonymity_set.saturating_add(1),
                    ..f
                },
                PrivacyFactors {
                    elapsed_secs: f.elapsed_secs.saturating_add(1),
                    ..f
                },
                PrivacyFactors {
                    counterparties: f.counterparties.saturating_add(1),
                    ..f
                },
                PrivacyFactors {
                    mixing_rounds: f.mixing_rounds.saturating_add(1),
                    ..f
                },
            ];
            for bumped in bumps {
                assert!(score(&bumped) >= base, "{bumped:?} scored below {f:?}");
            }
        }
    }
}
