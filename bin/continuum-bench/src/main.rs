use std::{path::PathBuf, time::Instant};

use clap::{value_parser, Arg, ArgMatches, Command};
use continuum_core::{
    prelude::*,
    random::{mutate_dfa, random_dfa, random_word, Mutation},
    show_duration,
};
use continuum_learning::prelude::*;
use csv::Writer;
use itertools::Itertools;
use owo_colors::OwoColorize;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info, trace, warn};
use tracing_subscriber::{filter, prelude::*};

const LEARNERS: [&str; 3] = ["restart", "incremental", "continuous"];

fn cli() -> Command {
    Command::new("continuum-bench")
        .about("Compares learners on targets that change while they are being learned")
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbosity")
                .num_args(0..=1)
                .require_equals(true)
                .value_parser(["info", "debug", "trace"])
                .default_missing_value("info"),
        )
        .arg(
            Arg::new("scenario")
                .long("scenario")
                .value_parser(["mut", "feat"])
                .default_value("mut")
                .help("chain of four mutations, or a single added feature"),
        )
        .arg(
            Arg::new("seeds")
                .long("seeds")
                .value_parser(value_parser!(u64))
                .default_value("10"),
        )
        .arg(
            Arg::new("size")
                .long("size")
                .value_parser(value_parser!(usize))
                .default_value("8")
                .help("number of states of the initial target"),
        )
        .arg(
            Arg::new("budget")
                .long("budget")
                .value_parser(value_parser!(usize))
                .default_value("10000"),
        )
        .arg(
            Arg::new("sample-every")
                .long("sample-every")
                .value_parser(value_parser!(usize))
                .default_value("100"),
        )
        .arg(
            Arg::new("revision-ratio")
                .long("revision-ratio")
                .value_parser(value_parser!(f64))
                .default_value("0.1"),
        )
        .arg(
            Arg::new("length-factor")
                .long("length-factor")
                .value_parser(value_parser!(f64))
                .default_value("0.9"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(value_parser!(PathBuf))
                .default_value("results.csv"),
        )
}

fn setup_logging(matches: &ArgMatches) {
    let Ok(Some(verbosity)) = matches.try_get_one::<String>("verbosity") else {
        return;
    };

    let level = match verbosity.as_str() {
        "trace" => filter::LevelFilter::TRACE,
        "debug" => filter::LevelFilter::DEBUG,
        "info" => filter::LevelFilter::INFO,
        _ => unreachable!(),
    };

    let stderr_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(stderr_log.with_filter(level))
        .init();

    trace!("setup {level} logging");
}

/// One scored hypothesis.
#[derive(Debug, Clone)]
struct Row {
    seed: u64,
    learner: &'static str,
    query: usize,
    states: usize,
    similarity: f64,
    equivalent: bool,
}

fn targets(scenario: &str, seed: u64, size: usize) -> Vec<Dfa> {
    let mut rng = StdRng::seed_from_u64(seed);
    let first = random_dfa(&mut rng, &alphabet!('a', 'b', 'c'), size);
    match scenario {
        "feat" => {
            let changed = mutate_dfa(&mut rng, &first, Mutation::AddFeature(size.div_ceil(2)));
            vec![first, changed]
        }
        _ => {
            let kinds = [
                Mutation::RedirectTransition,
                Mutation::FlipOutput,
                Mutation::AddState,
                Mutation::RemoveState,
            ];
            let mut chain = vec![first];
            for _ in 0..4 {
                let kind = *kinds.choose(&mut rng).expect("there are mutations");
                let last = chain.last().expect("the chain is never empty");
                let next = mutate_dfa(&mut rng, last, kind);
                debug!("{kind:?} turned {} states into {}", last.size(), next.size());
                chain.push(next);
            }
            chain
        }
    }
}

fn score(
    seed: u64,
    learner: &'static str,
    query: usize,
    hypothesis: &Hypothesis<CharAlphabet, Acceptor>,
    target: &Dfa,
    words: &[Vec<char>],
) -> Row {
    let agreeing = words
        .iter()
        .filter(|word| hypothesis.output(word) == Some(target.accepts(*word)))
        .count();
    let (dfa, _) = hypothesis.to_dfa();
    Row {
        seed,
        learner,
        query,
        states: hypothesis.size(),
        similarity: agreeing as f64 / words.len().max(1) as f64,
        equivalent: hypothesis.is_complete() && dfa.equivalent(target),
    }
}

fn run_restart(
    seed: u64,
    targets: &[Dfa],
    config: &LearnerConfig,
    words: &[Vec<char>],
) -> Result<Vec<Row>, LearningError<char>> {
    let phase = config.budget / targets.len();
    let mutating = MutatingOracle::new(targets.to_vec(), phase);
    let reviser = Reviser::with_config(LimitOracle::new(mutating.clone(), config.budget), config)?;
    let outcome = ConflictAware::new(reviser, false).run()?;
    info!(
        "seed {seed}: restarting learner saw {} conflicts",
        outcome.conflicts.len()
    );
    Ok(outcome
        .snapshots
        .iter()
        .map(|(query, hypothesis)| {
            let target = mutating.target_at(*query);
            score(seed, "restart", *query, hypothesis, target, words)
        })
        .collect())
}

fn run_incremental(
    seed: u64,
    targets: &[Dfa],
    words: &[Vec<char>],
) -> Result<Vec<Row>, LearningError<char>> {
    let mut rows = vec![];
    let mut offset = 0;
    let mut previous: Option<KearnsVazirani<CharAlphabet, Acceptor>> = None;
    for target in targets {
        let mut oracle = CountingOracle::new(SimulatorOracle::new(target.clone()));
        let mut equivalence = SimulatorOracle::new(target.clone());
        let mut learner = match &previous {
            Some(previous) => KearnsVazirani::resume(previous, &mut oracle)?,
            None => {
                let mut learner = KearnsVazirani::new(target.alphabet().clone(), false);
                learner.start(&mut oracle)?;
                learner
            }
        };
        rows.push(score(
            seed,
            "incremental",
            offset + oracle.count(),
            learner.hypothesis(),
            target,
            words,
        ));
        while let Some(counterexample) = equivalence.find_counterexample(learner.hypothesis())? {
            if !learner.refine(&counterexample, &mut oracle)? {
                warn!("seed {seed}: counterexample did not refine the hypothesis");
                break;
            }
            rows.push(score(
                seed,
                "incremental",
                offset + oracle.count(),
                learner.hypothesis(),
                target,
                words,
            ));
        }
        offset += oracle.count();
        previous = Some(learner);
    }
    Ok(rows)
}

fn run_continuous(
    seed: u64,
    targets: &[Dfa],
    config: &LearnerConfig,
    words: &[Vec<char>],
) -> Result<Vec<Row>, LearningError<char>> {
    let phase = config.budget / targets.len();
    let mut oracle = MutatingOracle::new(targets.to_vec(), phase);
    let mut learner =
        ContinuousLearner::<_, Acceptor>::with_config(alphabet!('a', 'b', 'c'), false, config)?;
    let snapshots = learner.learn(&mut oracle, config.budget, config.sample_every)?;
    Ok(snapshots
        .iter()
        .map(|(query, hypothesis)| {
            let target = oracle.target_at(*query);
            score(seed, "continuous", *query, hypothesis, target, words)
        })
        .collect())
}

fn run_seed(
    scenario: &str,
    seed: u64,
    size: usize,
    config: &LearnerConfig,
) -> Result<Vec<Row>, LearningError<char>> {
    let start = Instant::now();
    let targets = targets(scenario, seed, size);
    let config = config.clone().with_seed(seed);
    let mut rng = config.rng();
    let words: Vec<Vec<char>> = (0..1000)
        .map(|_| random_word(&mut rng, &alphabet!('a', 'b', 'c'), config.length_factor, 0))
        .collect();

    let mut rows = run_restart(seed, &targets, &config, &words)?;
    rows.extend(run_incremental(seed, &targets, &words)?);
    rows.extend(run_continuous(seed, &targets, &config, &words)?);
    info!("seed {seed} took {}", show_duration(start.elapsed()));
    Ok(rows)
}

fn write_rows(path: &PathBuf, scenario: &str, rows: &[Row]) -> csv::Result<()> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record([
        "scenario",
        "seed",
        "learner",
        "query",
        "states",
        "similarity",
        "equivalent",
    ])?;
    for row in rows {
        writer.write_record([
            scenario.to_string(),
            row.seed.to_string(),
            row.learner.to_string(),
            row.query.to_string(),
            row.states.to_string(),
            format!("{:.4}", row.similarity),
            row.equivalent.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn summary(rows: &[Row], seeds: u64) -> String {
    let mut builder = tabled::builder::Builder::default();
    builder.push_record(["learner", "final similarity", "converged runs", "queries"]);
    for learner in LEARNERS {
        let finals: Vec<&Row> = rows
            .iter()
            .filter(|row| row.learner == learner)
            .into_group_map_by(|row| row.seed)
            .into_values()
            .filter_map(|runs| runs.into_iter().max_by_key(|row| row.query))
            .collect();
        let similarity =
            finals.iter().map(|row| row.similarity).sum::<f64>() / finals.len().max(1) as f64;
        let converged = finals.iter().filter(|row| row.equivalent).count();
        let queries = finals.iter().map(|row| row.query).max().unwrap_or_default();
        let similarity = if similarity >= 0.99 {
            format!("{similarity:.3}").green().to_string()
        } else {
            format!("{similarity:.3}").red().to_string()
        };
        builder.push_record([
            learner.to_string(),
            similarity,
            format!("{converged}/{seeds}"),
            queries.to_string(),
        ]);
    }
    builder
        .build()
        .with(tabled::settings::Style::rounded())
        .to_string()
}

pub fn main() {
    let matches = cli().get_matches();
    setup_logging(&matches);

    let scenario = matches
        .get_one::<String>("scenario")
        .expect("scenario has a default")
        .clone();
    let seeds = *matches.get_one::<u64>("seeds").expect("seeds has a default");
    let size = *matches.get_one::<usize>("size").expect("size has a default");
    let output = matches
        .get_one::<PathBuf>("output")
        .expect("output has a default")
        .clone();
    let config = LearnerConfig::default()
        .with_budget(*matches.get_one::<usize>("budget").expect("budget has a default"))
        .with_sample_every(
            *matches
                .get_one::<usize>("sample-every")
                .expect("sample-every has a default"),
        )
        .with_revision_ratio(
            *matches
                .get_one::<f64>("revision-ratio")
                .expect("revision-ratio has a default"),
        )
        .with_length_factor(
            *matches
                .get_one::<f64>("length-factor")
                .expect("length-factor has a default"),
        );
    if let Err(e) = config.validate::<char>() {
        eprintln!("{}", e.red());
        std::process::exit(1);
    }

    info!("running scenario {scenario} for {seeds} seeds");
    let start = Instant::now();
    let results: Vec<_> = (0..seeds)
        .into_par_iter()
        .map(|seed| run_seed(&scenario, seed, size, &config))
        .collect();

    let mut rows = vec![];
    for (seed, result) in results.into_iter().enumerate() {
        match result {
            Ok(seed_rows) => rows.extend(seed_rows),
            Err(e) => warn!("seed {seed} failed: {e}"),
        }
    }

    if let Err(e) = write_rows(&output, &scenario, &rows) {
        eprintln!("could not write {}: {}", output.display(), e.red());
        std::process::exit(1);
    }
    println!("{}", summary(&rows, seeds));
    println!(
        "wrote {} rows to {} in {}",
        rows.len(),
        output.display().bold(),
        show_duration(start.elapsed())
    );
}
