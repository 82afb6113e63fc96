use crate::config::OperationMode;
use crate::PortNo;

/// Everything the decision core needs to know about one tunnel pair,
/// assembled by the engine from config, vectors and the statistics cache.
/// `traffic` is bytes transmitted since the pair's baseline was captured.
#[derive(Debug, Clone)]
pub struct PairState {
    pub ports: [PortNo; 2],
    pub reference: Option<[i64; 2]>,
    pub compensation: [i64; 2],
    pub compensating: bool,
    pub traffic: [u64; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub port: PortNo,
    /// The compensation budget was used up by this decision; the caller must
    /// clear the pair's compensating flag and restart its baseline.
    pub compensation_ended: bool,
}

/// Normalized target shares of the pair. Falls back to an even split when no
/// reference is installed or the pair sums to zero.
fn normalized_targets(reference: Option<[i64; 2]>) -> [f64; 2] {
    match reference {
        Some([r0, r1]) if r0 + r1 > 0 => {
            let sum = (r0 + r1) as f64;
            [r0 as f64 / sum, r1 as f64 / sum]
        }
        _ => [0.5, 0.5],
    }
}

/// Picks the egress tunnel for one pair.
///
/// While a pair is compensating toward tunnel `i`, that tunnel keeps the
/// traffic until its bytes since the baseline reach `C_i / t_other`: sending
/// the raw budget would itself be split by the target ratio later, so the
/// catch-up volume is scaled up by the share the other tunnel would have
/// taken. Once the budget is exhausted the flow at hand goes to the other
/// tunnel and the caller restarts the baseline.
///
/// Outside compensation, the tunnel whose observed share of the pair's bytes
/// is not above its target share wins; without a reference the first tunnel
/// is the fixed default.
pub fn decide_pair(mode: OperationMode, pair: &PairState) -> Verdict {
    let targets = if mode.uses_reference() {
        normalized_targets(pair.reference)
    } else {
        [0.5, 0.5]
    };

    if pair.compensating {
        if let Some(i) = (0..2).find(|&i| pair.compensation[i] > 0) {
            let other = 1 - i;
            let threshold = pair.compensation[i] as f64 / targets[other];
            if (pair.traffic[i] as f64) < threshold {
                log::debug!(
                    "compensating to port {}: {} < {}",
                    pair.ports[i],
                    pair.traffic[i],
                    threshold
                );
                return Verdict {
                    port: pair.ports[i],
                    compensation_ended: false,
                };
            }
            log::debug!(
                "compensation exhausted on port {}: {} >= {}",
                pair.ports[i],
                pair.traffic[i],
                threshold
            );
            return Verdict {
                port: pair.ports[other],
                compensation_ended: true,
            };
        }
    }

    if !mode.uses_reference() {
        return Verdict {
            port: pair.ports[0],
            compensation_ended: false,
        };
    }

    let total = pair.traffic[0] + pair.traffic[1];
    if total == 0 {
        return Verdict {
            port: pair.ports[0],
            compensation_ended: false,
        };
    }
    let share = pair.traffic[0] as f64 / total as f64;
    let port = if share <= targets[0] {
        pair.ports[0]
    } else {
        pair.ports[1]
    };
    log::debug!(
        "balancing: share {:.4} target {:.4} -> port {}",
        share,
        targets[0],
        port
    );
    Verdict {
        port,
        compensation_ended: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Trace {
        reference: [i64; 2],
        compensation: [i64; 2],
        start: [u64; 2],
        // (counters, expected port)
        states: Vec<([u64; 2], PortNo)>,
    }

    /// Replays a counter trace the way the engine drives the decision core:
    /// traffic is measured from the last baseline, and an exhausted
    /// compensation restarts the baseline at the current counters.
    fn replay(mode: OperationMode, trace: Trace) {
        let mut baseline = trace.start;
        let mut compensating = trace.compensation.iter().any(|&c| c != 0);
        for (step, (counters, expected)) in trace.states.iter().enumerate() {
            let pair = PairState {
                ports: [1, 2],
                reference: Some(trace.reference),
                compensation: trace.compensation,
                compensating,
                traffic: [
                    counters[0].saturating_sub(baseline[0]),
                    counters[1].saturating_sub(baseline[1]),
                ],
            };
            let verdict = decide_pair(mode, &pair);
            assert_eq!(
                verdict.port,
                *expected,
                "step {}: counters {:?}",
                step + 1,
                counters
            );
            if verdict.compensation_ended {
                compensating = false;
                baseline = *counters;
            }
        }
    }

    #[test]
    fn even_split_prefers_idle_tunnel() {
        replay(
            OperationMode::ReactiveWithReference,
            Trace {
                reference: [1_000_000, 1_000_000],
                compensation: [0, 0],
                start: [0, 0],
                states: vec![([1000, 0], 2)],
            },
        );
        replay(
            OperationMode::ReactiveWithReference,
            Trace {
                reference: [1_000_000, 1_000_000],
                compensation: [0, 0],
                start: [0, 0],
                states: vec![([0, 1000], 1)],
            },
        );
    }

    #[test]
    fn compensation_toward_first_tunnel() {
        replay(
            OperationMode::ReactiveWithReference,
            Trace {
                reference: [20_000_000_000, 10_000_000_000],
                compensation: [20_000_000, -20_000_000],
                start: [4_400_000_000, 5_900_000_000],
                states: vec![
                    ([4_417_000_000, 5_900_000_000], 1),
                    ([4_460_000_064, 5_900_000_000], 2),
                    ([4_460_000_064, 5_900_001_560], 1),
                    ([4_460_001_264, 5_900_001_560], 1),
                    ([4_460_007_896, 5_900_003_560], 2),
                    ([4_460_007_896, 5_900_004_560], 1),
                    ([4_460_008_096, 5_900_004_560], 1),
                    ([4_460_009_996, 5_900_004_560], 2),
                    ([4_460_009_996, 5_900_004_660], 2),
                    ([4_460_009_996, 5_900_004_860], 2),
                    ([4_460_009_996, 5_900_005_260], 1),
                    ([4_460_013_996, 5_900_005_260], 2),
                ],
            },
        );
    }

    #[test]
    fn compensation_toward_second_tunnel() {
        replay(
            OperationMode::ReactiveWithReference,
            Trace {
                reference: [20_000_000_000, 10_000_000_000],
                compensation: [-20_000_000, 20_000_000],
                start: [4_400_000_000, 5_900_000_000],
                states: vec![
                    ([4_400_000_000, 5_912_000_000], 2),
                    ([4_400_000_000, 5_930_000_064], 1),
                    ([4_400_000_233, 5_930_000_064], 2),
                    ([4_400_000_233, 5_930_000_364], 1),
                    ([4_400_001_033, 5_930_000_364], 2),
                    ([4_400_001_033, 5_930_000_964], 1),
                    ([4_400_001_233, 5_930_000_964], 1),
                    ([4_400_001_733, 5_930_000_964], 1),
                    ([4_400_002_733, 5_930_000_964], 2),
                    ([4_400_002_733, 5_930_001_964], 1),
                    ([4_400_003_755, 5_930_001_964], 1),
                    ([4_400_004_555, 5_930_001_964], 2),
                    ([4_400_004_555, 5_930_002_164], 2),
                ],
            },
        );
    }

    #[test]
    fn compensation_with_even_reference() {
        replay(
            OperationMode::ReactiveWithReference,
            Trace {
                reference: [25_000_000_000, 25_000_000_000],
                compensation: [10_000_000, -10_000_000],
                start: [6_800_000_000, 7_800_000_000],
                states: vec![
                    ([6_800_034_560, 7_800_000_000], 1),
                    ([6_800_006_788, 7_800_000_000], 1),
                    ([6_805_606_788, 7_800_000_000], 1),
                    ([6_819_606_788, 7_800_000_000], 1),
                    ([6_820_000_123, 7_800_000_000], 2),
                    ([6_820_000_123, 7_800_003_459], 1),
                    ([6_820_020_123, 7_800_003_459], 2),
                    ([6_820_020_123, 7_800_023_459], 1),
                    ([6_820_023_123, 7_800_023_459], 1),
                    ([6_820_031_123, 7_800_023_459], 2),
                    ([6_820_031_123, 7_800_043_550], 1),
                    ([6_820_071_123, 7_800_043_550], 2),
                    ([6_820_071_123, 7_800_073_470], 1),
                    ([6_820_141_117, 7_800_073_470], 2),
                ],
            },
        );
    }

    #[test]
    fn without_reference_falls_back_to_first_tunnel() {
        // Compensation still runs (with even targets), then the first tunnel
        // becomes the fixed default.
        replay(
            OperationMode::ReactiveWithoutReference,
            Trace {
                reference: [20_000_000_000, 10_000_000_000], // ignored
                compensation: [10_000_000, -10_000_000],
                start: [0, 0],
                states: vec![
                    ([5_000_000, 0], 1),
                    ([20_000_000, 0], 2), // budget / 0.5 reached
                    ([20_000_000, 1_000_000], 1),
                    ([20_000_000, 9_000_000], 1),
                ],
            },
        );
    }

    #[test]
    fn no_reference_defaults_to_even_targets() {
        let pair = PairState {
            ports: [1, 2],
            reference: None,
            compensation: [0, 0],
            compensating: false,
            traffic: [400, 600],
        };
        let verdict = decide_pair(OperationMode::ReactiveWithReference, &pair);
        assert_eq!(verdict.port, 1); // 0.4 <= 0.5
    }

    #[test]
    fn zero_total_picks_first_tunnel() {
        let pair = PairState {
            ports: [1, 2],
            reference: Some([3, 1]),
            compensation: [0, 0],
            compensating: false,
            traffic: [0, 0],
        };
        assert_eq!(
            decide_pair(OperationMode::ReactiveWithReference, &pair).port,
            1
        );
    }

    #[test]
    fn zero_sum_reference_treated_as_even() {
        let pair = PairState {
            ports: [1, 2],
            reference: Some([0, 0]),
            compensation: [0, 0],
            compensating: false,
            traffic: [600, 400],
        };
        assert_eq!(
            decide_pair(OperationMode::ReactiveWithReference, &pair).port,
            2
        );
    }
}
