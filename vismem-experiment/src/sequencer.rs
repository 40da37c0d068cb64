use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;
use vismem_core::TrialSlot;

use crate::config::SessionConfig;

/// Splits `total` over `slots` buckets: every bucket gets `total / slots`,
/// the first `total % slots` buckets get one more.
pub fn distribute(total: usize, slots: usize) -> Vec<usize> {
    if slots == 0 {
        return Vec::new();
    }
    let base = total / slots;
    let remainder = total % slots;
    (0..slots)
        .map(|i| base + usize::from(i < remainder))
        .collect()
}

/// Practice slots followed by main slots. Each pool is shuffled on its own,
/// so practice never interleaves with main.
pub fn build_trials<R: Rng + ?Sized>(config: &SessionConfig, rng: &mut R) -> Vec<TrialSlot> {
    let conditions = config.conditions();
    let practice_counts = distribute(config.practice_trials_total, conditions.len());
    let main_counts = distribute(config.main_trials_total, conditions.len());

    let mut practice = Vec::with_capacity(config.practice_trials_total);
    let mut main = Vec::with_capacity(config.main_trials_total);
    for (i, condition) in conditions.iter().enumerate() {
        practice.extend((0..practice_counts[i]).map(|_| TrialSlot::new(true, condition)));
        main.extend((0..main_counts[i]).map(|_| TrialSlot::new(false, condition)));
    }

    practice.shuffle(rng);
    main.shuffle(rng);

    debug!(
        practice = practice.len(),
        main = main.len(),
        conditions = conditions.len(),
        "sequenced trials"
    );

    practice.extend(main);
    practice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::RandomSource;
    use proptest::prelude::*;

    fn count(slots: &[TrialSlot], practice: bool, name: &str) -> usize {
        slots
            .iter()
            .filter(|s| s.is_practice == practice && s.condition_name == name)
            .count()
    }

    #[test]
    fn distributes_remainder_to_leading_slots() {
        assert_eq!(distribute(10, 3), vec![4, 3, 3]);
        assert_eq!(distribute(2, 3), vec![1, 1, 0]);
        assert_eq!(distribute(0, 2), vec![0, 0]);
        assert!(distribute(5, 0).is_empty());
    }

    #[test]
    fn two_conditions_with_remainder() {
        let config = SessionConfig {
            n_choices: 4,
            segment_count: 4,
            shared_quadrants: 1,
            delay_ms_list: vec![0, 4000],
            practice_trials_total: 2,
            main_trials_total: 8,
            ..SessionConfig::default()
        };
        let slots = build_trials(&config, &mut RandomSource::seeded(7));

        assert_eq!(slots.len(), 10);
        assert_eq!(count(&slots, true, "SIMULTANEOUS"), 1);
        assert_eq!(count(&slots, true, "DELAY 4000ms"), 1);
        assert_eq!(count(&slots, false, "SIMULTANEOUS"), 4);
        assert_eq!(count(&slots, false, "DELAY 4000ms"), 4);
        assert!(slots[..2].iter().all(|s| s.is_practice));
        assert!(slots[2..].iter().all(|s| !s.is_practice));

        for slot in &slots {
            assert_eq!(slot.simultaneous, slot.delay_ms == 0);
            assert!(slot.spec.is_none());
        }
    }

    #[test]
    fn seeded_sequencing_is_reproducible() {
        let config = SessionConfig::default();
        let names = |seed| -> Vec<(bool, String)> {
            build_trials(&config, &mut RandomSource::seeded(seed))
                .into_iter()
                .map(|s| (s.is_practice, s.condition_name))
                .collect()
        };
        assert_eq!(names(99), names(99));
    }

    proptest! {
        #[test]
        fn distribute_sums_to_total(total in 0usize..500, slots in 1usize..12) {
            let counts = distribute(total, slots);
            prop_assert_eq!(counts.len(), slots);
            prop_assert_eq!(counts.iter().sum::<usize>(), total);
            let extra = total % slots;
            for (i, c) in counts.iter().enumerate() {
                prop_assert_eq!(*c, total / slots + usize::from(i < extra));
            }
        }

        #[test]
        fn practice_always_precedes_main(
            practice in 0usize..30,
            main in 1usize..60,
            delays in proptest::collection::vec(0u64..20_000, 1..5),
            seed in any::<u32>(),
        ) {
            let config = SessionConfig {
                delay_ms_list: delays,
                practice_trials_total: practice,
                main_trials_total: main,
                ..SessionConfig::default()
            };
            let slots = build_trials(&config, &mut RandomSource::seeded(seed));
            prop_assert_eq!(slots.len(), practice + main);
            let first_main = slots.iter().position(|s| !s.is_practice).unwrap_or(slots.len());
            prop_assert!(slots[first_main..].iter().all(|s| !s.is_practice));

            let conditions = config.conditions();
            let expected_practice = config.practice_distribution();
            let expected_main = config.main_distribution();
            for (i, c) in conditions.iter().enumerate() {
                prop_assert_eq!(count(&slots, true, &c.name), expected_practice[i]);
                prop_assert_eq!(count(&slots, false, &c.name), expected_main[i]);
            }
        }
    }
}
