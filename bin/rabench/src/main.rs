use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use raben::math::cartesian_product;
use raben::prelude::*;
use raben::tasks::{output_path, write_atomic, IntRange};
use wikira::GuardDialect;

#[derive(Debug, Parser)]
#[command(name = "rabench", version, about = "Generates register automaton benchmark corpora")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Concatenate a sampled DFA, a register gadget and a second sampled DFA.
    DfaRaDfa(CommonArgs),
    /// Sample a DFA and replace a share of its transitions with register gadgets.
    DfaReplaceWithRa(ReplaceArgs),
    /// Sample a DFA and split one of its locations with a register discriminator.
    DfaSingleDiscriminator(CommonArgs),
}

#[derive(Debug, Clone, Args)]
struct CommonArgs {
    /// Number of DFA states, e.g. `4`, `2..6` or `2..<10 step 2`.
    #[arg(long, default_value = "4")]
    states: IntRange,
    /// Alphabet sizes.
    #[arg(long, default_value = "2")]
    letters: IntRange,
    /// Arity of every input symbol.
    #[arg(long, default_value = "1")]
    params: IntRange,
    /// Random seeds; one output file per seed.
    #[arg(long, default_value = "0..<10")]
    seeds: IntRange,
    /// Probability that a sampled location accepts.
    #[arg(long, default_value_t = 0.5)]
    accept_probability: f64,
    /// Pad the input alphabet with unused symbols up to this label count.
    #[arg(long)]
    min_labels: Option<usize>,
    /// Output directory.
    #[arg(short, long, default_value = "benchmarks")]
    out: PathBuf,
    /// Overwrite existing files.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Clone, Args)]
struct ReplaceArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Share of the independent transitions to replace.
    #[arg(long, default_value_t = 0.5)]
    share: f64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::from_default_env()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::DfaRaDfa(args) => generate(&args, &|task, rng| {
            let first = sample_dfa(task, "q", rng)?;
            let second = sample_dfa(task, "s", rng)?;
            let spliced = concat(&first, &register_gadget(task.n_parameters)?)?;
            Ok(concat(&spliced, &second)?)
        }),
        Command::DfaReplaceWithRa(args) => {
            let share = args.share;
            generate(&args.common, &move |task, rng| {
                let host = sample_dfa(task, "q", rng)?;
                let gadget = register_gadget(task.n_parameters)?;
                Ok(partial_replacement(&host, share, &[gadget], rng)?)
            })
        }
        Command::DfaSingleDiscriminator(args) => generate(&args, &|task, rng| {
            let host = sample_dfa(task, "q", rng)?;
            let discriminator = register_gadget(task.n_parameters)?;
            Ok(split_single(&host, &discriminator, rng)?)
        }),
    }
}

/// One point of the parameter product.
struct Task {
    n_states: usize,
    alphabet: Vec<String>,
    n_parameters: usize,
    accept_probability: f64,
    seed: u64,
}

type Pipeline = dyn Fn(&Task, &mut StdRng) -> anyhow::Result<RegisterAutomaton> + Sync;

fn generate(args: &CommonArgs, pipeline: &Pipeline) -> anyhow::Result<()> {
    let dimensions = [args.states.values(), args.letters.values(), args.params.values()];
    for (name, dimension, minimum) in [
        ("states", &dimensions[0], 1),
        ("letters", &dimensions[1], 2),
        ("params", &dimensions[2], 0),
    ] {
        if dimension.iter().any(|&value| value < minimum) {
            anyhow::bail!("--{name} must not go below {minimum}");
        }
    }
    if !(0.0..=1.0).contains(&args.accept_probability) {
        anyhow::bail!("--accept-probability must lie within [0, 1]");
    }

    let mut tasks = Vec::new();
    for point in cartesian_product(&dimensions) {
        for seed in args.seeds.values() {
            tasks.push((point.clone(), seed));
        }
    }
    info!("running {} generation tasks", tasks.len());

    let written = AtomicUsize::new(0);
    tasks.par_iter().for_each(|(point, seed)| {
        let task = Task {
            n_states: point[0] as usize,
            alphabet: letter_names(point[1] as usize),
            n_parameters: point[2] as usize,
            accept_probability: args.accept_probability,
            seed: *seed as u64,
        };
        let parameters: Vec<i64> = point.clone();
        let path = output_path(&args.out, &parameters, task.seed);

        match run_task(&task, pipeline, args.min_labels) {
            Ok(xml) => match write_atomic(&path, &xml, args.force) {
                Ok(true) => {
                    written.fetch_add(1, Ordering::Relaxed);
                }
                Ok(false) => {}
                Err(error) => warn!("could not write `{}`: {error}", path.display()),
            },
            Err(error) => warn!("task for `{}` failed: {error:#}", path.display()),
        }
    });

    info!("wrote {} files below `{}`", written.load(Ordering::Relaxed), args.out.display());
    Ok(())
}

fn run_task(
    task: &Task,
    pipeline: &Pipeline,
    min_labels: Option<usize>,
) -> anyhow::Result<String> {
    let mut rng = StdRng::seed_from_u64(task.seed);
    let ra = pipeline(task, &mut rng)?;

    let used: usize =
        ra.transitions().map(|(_, t)| t.symbol().label()).collect::<math::Set<_>>().len();
    let bonus: Vec<LabeledSymbol> = (used..min_labels.unwrap_or(0))
        .map(|i| LabeledSymbol::with_arity(format!("bonus{i}"), task.n_parameters))
        .collect();

    let wiki = ra_to_wiki(&ra, &bonus).context("conversion to the wiki form failed")?;
    let xml = wiki
        .to_xml_string(GuardDialect::RalibSafe)
        .context("guard serialisation failed")?;
    Ok(xml)
}

fn sample_dfa(task: &Task, prefix: &str, rng: &mut StdRng) -> anyhow::Result<RegisterAutomaton> {
    let ra = champarnaud_paranthoen_ra(
        task.n_states,
        &task.alphabet,
        task.n_parameters,
        &Guard::True,
        task.accept_probability,
        prefix,
        rng,
    )?;
    Ok(ra)
}

/// A store-then-compare gadget: the first input stores its leading parameter
/// in a register, the second is guarded by a comparison against it.
fn register_gadget(n_parameters: usize) -> anyhow::Result<RegisterAutomaton> {
    let mut gadget = RegisterAutomaton::new("g0", false);
    gadget.add_location("g1", false)?;
    gadget.add_location("g2", true)?;

    let store = LabeledSymbol::with_arity("store", n_parameters);
    let compare = LabeledSymbol::with_arity("cmp", n_parameters);

    if n_parameters == 0 {
        gadget.add_transition("g0", store, Guard::True, math::Map::default(), "g1")?;
        gadget.add_transition("g1", compare, Guard::True, math::Map::default(), "g2")?;
        return Ok(gadget);
    }

    gadget.add_register("r0")?;
    let mut assignment = math::Map::default();
    assignment.insert("r0".to_string(), Symbol::parameter("p0"));
    gadget.add_transition("g0", store, Guard::True, assignment, "g1")?;
    gadget.add_transition(
        "g1",
        compare,
        Guard::eq(Symbol::parameter("p0"), Symbol::register("r0")),
        math::Map::default(),
        "g2",
    )?;
    Ok(gadget)
}

fn letter_names(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            if i < 26 {
                ((b'a' + i as u8) as char).to_string()
            } else {
                format!("s{i}")
            }
        })
        .collect()
}
