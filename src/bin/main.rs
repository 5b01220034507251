use clap::Parser;
use dist_fft2d::{
    cluster::{gather, run_local},
    errors::FftError,
    parameters::{FftConfig, PlanHint},
    reference::{max_abs_error, transform_2d},
    workload::{Input, global_rows, partition_rows},
};
use tracing::info;
use tracing_forest::{ForestLayer, util::LevelFilter};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Total x dimension.
    #[arg(long, default_value = "8")]
    nx: usize,

    /// Total y dimension (real samples per row).
    #[arg(long, default_value = "14")]
    ny: usize,

    /// Number of nodes, each running on its own thread.
    #[arg(short = 'n', long, default_value = "2")]
    nodes: usize,

    /// Communication scheme: scatter or all_to_all.
    #[arg(long, default_value = "scatter")]
    run: String,

    /// Planning effort of the 1D transforms.
    #[arg(long, default_value = "estimate")]
    plan: PlanHint,

    /// Print the transformed rows of every node.
    #[arg(long)]
    result: bool,

    /// Input values: ramp or random.
    #[arg(long, default_value = "ramp")]
    input: Input,

    /// Seed of the random input.
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Compare against a single-node transform.
    #[arg(long)]
    verify: bool,
}

fn main() -> Result<(), FftError> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    Registry::default()
        .with(env_filter)
        .with(ForestLayer::default())
        .init();

    let args = Args::parse();

    let config = FftConfig::new(args.nx, args.ny, args.run).with_plan(args.plan);
    let geometry = config.geometry(args.nodes)?;
    let rows = global_rows(&geometry, args.input, args.seed);

    // The reference works on its own copy of the input
    let expected = args.verify.then(|| transform_2d(&geometry, rows.clone()));

    let outputs = run_local(&config, partition_rows(&geometry, rows))?;

    if args.result {
        for output in &outputs {
            print!("{output}");
        }
    }

    if let Some(expected) = expected {
        let err = max_abs_error(&gather(outputs), &expected);
        info!(max_abs_error = err, "verified against single-node transform");
        println!("max abs error: {err:e}");
    }

    Ok(())
}
