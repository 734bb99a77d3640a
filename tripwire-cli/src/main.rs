//! Tripwire CLI - audit text against the guardrail checks.

#![allow(clippy::print_stdout)]

use std::io::Read;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tripwire::{
    CallContext, CheckRegistry, ExecutionMode, FailurePolicy, Guard, GuardConfig, Stage,
};
use tripwire_cli::{render_checks, render_result};

/// Guardrail stage selector.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StageArg {
    /// Checks applied to user messages.
    Input,
    /// Checks applied to agent responses.
    Output,
}

impl From<StageArg> for Stage {
    fn from(stage: StageArg) -> Self {
        match stage {
            StageArg::Input => Self::Input,
            StageArg::Output => Self::Output,
        }
    }
}

/// Tripwire CLI - LLM-judged guardrails for conversational agents
#[derive(Parser, Debug)]
#[command(name = "tripwire")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the registered checks and their reply fields
    Checks {
        /// Only list checks of this stage
        #[arg(long, value_enum)]
        stage: Option<StageArg>,
    },
    /// Judge a user message with the input checks
    Input(RunArgs),
    /// Judge a candidate response with the output checks
    Output(RunArgs),
}

#[derive(ClapArgs, Debug)]
struct RunArgs {
    /// Text to judge; `-` reads standard input
    text: String,

    /// Print the full pipeline result as JSON
    #[arg(long)]
    json: bool,

    /// Run checks one at a time instead of concurrently
    #[arg(long)]
    sequential: bool,

    /// Per-call oracle timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Count failed oracle calls as trips
    #[arg(long)]
    fail_closed: bool,

    /// Leave a check out (`name`, `input:name` or `output:name`)
    #[arg(long = "skip", value_name = "CHECK")]
    skip: Vec<String>,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("tripwire=debug,tripwire_cli=debug")
    } else {
        EnvFilter::new("tripwire=warn,tripwire_cli=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn guard_config(args: &RunArgs) -> anyhow::Result<GuardConfig> {
    let mut config = GuardConfig::from_env().context("oracle is not configured")?;
    if args.sequential {
        config.pipeline.mode = ExecutionMode::Sequential;
    }
    if let Some(secs) = args.timeout {
        config.pipeline.call_timeout_ms = (secs > 0).then(|| secs.saturating_mul(1000));
    }
    if args.fail_closed {
        config.pipeline.failure_policy = FailurePolicy::FailClosed;
    }
    config.disabled_checks.extend(args.skip.iter().cloned());
    Ok(config)
}

async fn run(stage: Stage, args: &RunArgs) -> anyhow::Result<ExitCode> {
    let text = if args.text == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read standard input")?;
        buf
    } else {
        args.text.clone()
    };

    let guard = Guard::from_config(&guard_config(args)?)?;
    let ctx = CallContext::new();
    tracing::info!(turn_id = %ctx.turn_id, %stage, "judging text");

    let (result, action) = guard.evaluate(stage, &text, &ctx).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_result(&result, &action));
    }

    Ok(if action.is_blocked() {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Checks { stage } => {
            let registry = CheckRegistry::standard()?;
            print!("{}", render_checks(&registry, stage.map(Stage::from)));
            Ok(ExitCode::SUCCESS)
        }
        Command::Input(run_args) => run(Stage::Input, &run_args).await,
        Command::Output(run_args) => run(Stage::Output, &run_args).await,
    }
}
