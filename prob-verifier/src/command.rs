// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The prob-verifier binary's command-line interface.

use std::path::Path;
use std::{fs, process};

use clap::Args;
use codespan_reporting::{
    files::SimpleFile,
    term::{
        self as terminal,
        termcolor::{ColorChoice, StandardStream},
    },
};

use checker::{check_properties, timing, CheckSettings, Engine, PropertyReport, PropertyStatus};
use logic::parser::{parse_error_diagnostic, parse_properties};
use logic::{printer, syntax::Property};
use models::{parse_model, SparseModel};

use crate::options::{describe_options, parse_solver_options};

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum ColorOutput {
    Never,
    Auto,
    Always,
}

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum EngineChoice {
    Sparse,
    Symbolic,
}

#[derive(Args, Clone, Debug, PartialEq, Eq)]
struct ModelArgs {
    /// File name for the transitions file
    transitions: String,

    /// File name for the state labeling file
    labels: String,

    #[arg(long)]
    /// File name for a state rewards file
    state_rewards: Option<String>,

    #[arg(long)]
    /// File name for a transition rewards file
    transition_rewards: Option<String>,

    #[arg(long)]
    /// File name for a choice labeling file
    choice_labels: Option<String>,
}

impl ModelArgs {
    /// Read and parse the model files, exiting with a message on failure.
    fn load(&self) -> SparseModel {
        let transitions = read(&self.transitions);
        let labels = read(&self.labels);
        let state_rewards = self.state_rewards.as_deref().map(read);
        let transition_rewards = self.transition_rewards.as_deref().map(read);
        let choice_labels = self.choice_labels.as_deref().map(read);
        match parse_model(
            &transitions,
            &labels,
            state_rewards.as_deref(),
            transition_rewards.as_deref(),
            choice_labels.as_deref(),
        ) {
            Ok(model) => model,
            Err(error) => {
                eprintln!("could not load model: {error}");
                process::exit(1);
            }
        }
    }
}

#[derive(Args, Clone, Debug, PartialEq, Eq)]
struct CheckArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// File name for the properties file, one property per line
    properties: String,

    #[arg(value_enum, long, default_value_t = EngineChoice::Sparse)]
    /// Engine to check with
    engine: EngineChoice,

    #[arg(long)]
    /// Print the optimizing scheduler of nondeterministic models
    schedulers: bool,

    #[arg(long)]
    /// Print timing statistics
    time: bool,

    /// Raw solver options, as in `--minmax:maxiter 100` (see `print` for
    /// the registry)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    solver_options: Vec<String>,
}

#[derive(clap::Subcommand, Clone, Debug, PartialEq, Eq)]
enum Command {
    /// Check every property of a properties file against a model.
    Check(CheckArgs),
    /// Parse a model and a properties file and print what was understood
    /// (for debugging).
    Print {
        #[command(flatten)]
        model: ModelArgs,
        /// File name for the properties file
        properties: Option<String>,
    },
}

#[derive(clap::Parser, Debug)]
#[command(about, long_about=None)]
/// Entrypoint for the prob-verifier binary, including all commands.
pub struct App {
    #[arg(value_enum, long, default_value_t = ColorOutput::Auto)]
    /// Control color output. Auto disables colors with TERM=dumb or
    /// NO_COLOR=true.
    color: ColorOutput,

    #[command(subcommand)]
    /// Command to run
    command: Command,
}

fn read(name: &str) -> String {
    match fs::read_to_string(name) {
        Ok(content) => content,
        Err(error) => {
            eprintln!("could not read {name}: {error}");
            process::exit(1);
        }
    }
}

impl App {
    /// Run the application.
    pub fn exec(self) {
        let writer = StandardStream::stderr(match &self.color {
            ColorOutput::Never => ColorChoice::Never,
            ColorOutput::Always => ColorChoice::Always,
            ColorOutput::Auto => ColorChoice::Auto,
        });
        let config = codespan_reporting::term::Config {
            start_context_lines: 3,
            end_context_lines: 3,
            ..Default::default()
        };

        match self.command {
            Command::Print { model, properties } => {
                let model = model.load();
                println!(
                    "{} with {} states and {} choices",
                    model.model_type,
                    model.state_count(),
                    model.choice_count()
                );
                let labels: Vec<&str> = model.labeling.labels().collect();
                println!("labels: {}", labels.join(" "));
                if let Some(name) = properties {
                    let content = read(&name);
                    let properties = parse_or_exit(&name, &content, &writer, &config);
                    for property in &properties {
                        println!("{}", printer::property(property));
                    }
                }
                println!("solver options:\n{}", describe_options());
            }
            Command::Check(args) => {
                let model = args.model.load();
                let content = read(&args.properties);
                let properties = parse_or_exit(&args.properties, &content, &writer, &config);

                let solver = match parse_solver_options(&args.solver_options) {
                    Ok(solver) => solver,
                    Err(problems) => {
                        for problem in &problems {
                            eprintln!("{problem}");
                        }
                        process::exit(1);
                    }
                };
                let settings = CheckSettings {
                    engine: match args.engine {
                        EngineChoice::Sparse => Engine::Sparse,
                        EngineChoice::Symbolic => Engine::Symbolic,
                    },
                    minmax: solver.minmax_settings(),
                    produce_schedulers: args.schedulers,
                };

                let reports = check_properties(&model, &properties, &settings);
                let mut failed = false;
                for report in &reports {
                    print_report(report, args.schedulers);
                    failed |= !matches!(report.status, PropertyStatus::Checked);
                }
                if args.time {
                    timing::report();
                }
                if failed {
                    process::exit(1);
                }
            }
        }
    }
}

fn parse_or_exit(
    name: &str,
    content: &str,
    writer: &StandardStream,
    config: &codespan_reporting::term::Config,
) -> Vec<Property> {
    // keep paths looking like Unix paths on all platforms so that output
    // comparisons are stable
    let standardized = Path::new(name).to_string_lossy().replace('\\', "/");
    let files = SimpleFile::new(standardized, content);
    match parse_properties(content) {
        Ok(properties) => properties,
        Err(error) => {
            let diagnostic = parse_error_diagnostic((), &error);
            terminal::emit(&mut writer.lock(), config, &files, &diagnostic).unwrap();
            process::exit(1);
        }
    }
}

fn print_report(report: &PropertyReport, schedulers: bool) {
    match &report.name {
        Some(name) => println!("checking \"{name}\": {}", report.description),
        None => println!("checking {}", report.description),
    }
    match &report.status {
        PropertyStatus::Checked => {
            for verdict in &report.verdicts {
                let holds = match verdict.holds {
                    Some(true) => " (holds)",
                    Some(false) => " (violated)",
                    None => "",
                };
                println!("  state {} = {}{holds}", verdict.state, verdict.value);
            }
            if schedulers {
                if let Some(choices) = &report.scheduler {
                    let rendered: Vec<String> = choices
                        .iter()
                        .enumerate()
                        .map(|(state, choice)| format!("{state}:{choice}"))
                        .collect();
                    println!("  scheduler: {}", rendered.join(" "));
                }
            }
        }
        PropertyStatus::Diverged { iterations } => {
            println!("  no convergence within {iterations} iterations");
        }
        PropertyStatus::Cancelled => println!("  cancelled"),
        PropertyStatus::Rejected { reason } => println!("  rejected: {reason}"),
        PropertyStatus::Failed { reason } => println!("  failed: {reason}"),
    }
}
