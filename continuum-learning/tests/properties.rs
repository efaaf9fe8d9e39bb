use continuum_core::{prelude::*, random::random_dfa};
use continuum_learning::{active::Bisection, datastructure::DiscriminationTree, prelude::*};
use proptest::prelude::*;
use rand::{rngs::StdRng, SeedableRng};

fn check_separation<O>(tree: &DiscriminationTree<CharAlphabet, Acceptor>, oracle: &mut O)
where
    O: MembershipOracle<Alphabet = CharAlphabet, Semantics = Acceptor>,
{
    let leaves: Vec<_> = tree.leaves().collect();
    for (i, a) in leaves.iter().enumerate() {
        for b in &leaves[i + 1..] {
            let (discriminator, key_a, key_b) =
                tree.separation(*a, *b).expect("distinct leaves are separated");
            assert_ne!(key_a, key_b);
            let access_a = tree.try_access(*a).expect("leaves have an access sequence");
            let access_b = tree.try_access(*b).expect("leaves have an access sequence");
            assert_eq!(&oracle.answer_split(access_a, discriminator).unwrap(), key_a);
            assert_eq!(&oracle.answer_split(access_b, discriminator).unwrap(), key_b);
        }
    }
}

#[test_log::test]
fn leaves_are_separated_by_their_common_ancestor() {
    let mut rng = StdRng::seed_from_u64(31);
    for size in [3, 6] {
        let target = random_dfa(&mut rng, &alphabet!('a', 'b'), size);
        let mut oracle = SimulatorOracle::new(target.clone());

        let mut kv = KearnsVazirani::<_, Acceptor>::new(target.alphabet().clone(), false);
        kv.learn(&mut oracle).unwrap();
        check_separation(kv.tree(), &mut oracle);

        let mut continuous = ContinuousLearner::<_, Acceptor>::new(
            target.alphabet().clone(),
            false,
            0.9,
            StdRng::seed_from_u64(size as u64),
        );
        continuous.learn(&mut oracle, 10_000, 10_000).unwrap();
        let tree = continuous.tree();
        let leaves: Vec<_> = tree.leaves().collect();
        for (i, a) in leaves.iter().enumerate() {
            for b in &leaves[i + 1..] {
                let (_, key_a, key_b) = tree.separation(*a, *b).expect("distinct leaves");
                assert_ne!(key_a, key_b);
            }
        }
        let (dfa, _) = continuous.hypothesis().to_dfa();
        assert!(dfa.equivalent(&target));
    }
}

#[test_log::test]
fn extraction_is_deterministic() {
    let target = random_dfa(&mut StdRng::seed_from_u64(2), &alphabet!('a', 'b'), 4);
    let mut learner = ContinuousLearner::<_, Acceptor>::new(
        target.alphabet().clone(),
        false,
        0.9,
        StdRng::seed_from_u64(0),
    );
    learner
        .learn(&mut SimulatorOracle::new(target), 500, 500)
        .unwrap();
    assert_eq!(learner.tree().extract(false), learner.tree().extract(false));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]
    #[test]
    fn counterexamples_split_states_that_the_target_separates(
        seed in any::<u64>(),
        size in 2usize..7,
    ) {
        let target = random_dfa(&mut StdRng::seed_from_u64(seed), &alphabet!('a', 'b'), size);
        let mut oracle = CountingOracle::new(SimulatorOracle::new(target.clone()));
        let mut equivalence = SimulatorOracle::new(target.clone());
        let mut kv = KearnsVazirani::<_, Acceptor>::new(target.alphabet().clone(), false);
        kv.start(&mut oracle).unwrap();

        while let Some(counterexample) = equivalence.find_counterexample(kv.hypothesis()).unwrap() {
            let before: Vec<Vec<char>> = kv
                .tree()
                .leaf_accesses()
                .into_iter()
                .map(<[_]>::to_vec)
                .collect();
            prop_assert!(kv.refine(&counterexample, &mut oracle).unwrap());
            let tree = kv.tree();
            prop_assert!(tree.leaf_count() > before.len());

            // every new state is told apart from its siblings by what the target answers
            for long in tree.leaves() {
                let long_access = tree.try_access(long).expect("leaves have an access sequence");
                if before.iter().any(|access| access == long_access) {
                    continue;
                }
                let parent = tree.try_parent(long).expect("there are at least two leaves");
                for short in tree.leaves() {
                    if short == long || tree.lowest_common_ancestor(short, long) != parent {
                        continue;
                    }
                    let short_access = tree.try_access(short).expect("leaves have an access sequence");
                    let (discriminator, long_key, short_key) =
                        tree.separation(long, short).expect("distinct leaves are separated");
                    prop_assert_ne!(long_key, short_key);
                    prop_assert_eq!(&oracle.answer_split(long_access, discriminator).unwrap(), long_key);
                    prop_assert_eq!(&oracle.answer_split(short_access, discriminator).unwrap(), short_key);
                }
            }
        }

        prop_assert!(oracle.count() > 0);
        let (dfa, _) = kv.hypothesis().to_dfa();
        prop_assert!(dfa.equivalent(&target));
    }
}

fn word_and_answers() -> impl Strategy<Value = (Vec<char>, Vec<bool>)> {
    prop::collection::vec(prop::sample::select(vec!['a', 'b']), 1..=50).prop_flat_map(|word| {
        let len = word.len();
        (
            Just(word),
            prop::collection::vec(any::<bool>(), len - 1).prop_map(|inner| {
                std::iter::once(false)
                    .chain(inner)
                    .chain(std::iter::once(true))
                    .collect()
            }),
        )
    })
}

proptest! {
    #[test]
    fn bisection_ends_at_a_breakpoint((word, agrees) in word_and_answers()) {
        let mut search = Bisection::new(word.clone());
        let mut probes = 0;
        while !search.is_final() {
            let probe = search.probe();
            prop_assert!(probe > search.pre().len());
            prop_assert!(probe < search.pre().len() + search.middle().len());
            search = search.narrow(agrees[probe]);
            probes += 1;
        }
        prop_assert!(probes <= 6);
        prop_assert_eq!(search.middle().len(), 1);
        prop_assert!(!agrees[search.pre().len()]);
        prop_assert!(agrees[search.pre().len() + 1]);
        let rebuilt = search.pre().followed_by(search.middle()).followed_by(search.post());
        prop_assert_eq!(rebuilt, word);
    }
}
