// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The module-grouped option registry behind the raw `--module:name`
//! arguments.
//!
//! Solver options do not go through clap: they arrive as uninterpreted
//! trailing tokens and are matched against a typed registry, so that new
//! solver modules can register options without touching the command
//! definitions. Parsing collects every problem before reporting, so a
//! misspelled option and an out-of-range value surface in one run.

use std::fmt;

use numeric::{ConvergenceCriterion, MinMaxSettings, SolutionMethod};

/// The type of a single option argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgumentType {
    String,
    UnsignedInteger,
    Double,
}

/// One registered option: its module, names, and argument shape.
struct OptionRule {
    module: &'static str,
    long: &'static str,
    short: Option<&'static str>,
    description: &'static str,
    argument: Option<ArgumentType>,
}

impl OptionRule {
    fn matches(&self, module: Option<&str>, name: &str) -> bool {
        let name_matches = name == self.long || self.short == Some(name);
        match module {
            Some(module) => module == self.module && name_matches,
            None => name_matches,
        }
    }
}

/// A problem found while parsing raw options. All problems of a run are
/// collected and reported together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionProblem {
    /// The token does not name a registered option.
    UnknownOption(String),
    /// The option needs an argument but the token stream ended.
    MissingArgument(String),
    /// The argument does not parse or is out of range.
    BadArgument {
        /// The option the argument belongs to.
        option: String,
        /// What was wrong.
        message: String,
    },
}

impl fmt::Display for OptionProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionProblem::UnknownOption(token) => write!(f, "unknown option `{token}`"),
            OptionProblem::MissingArgument(option) => {
                write!(f, "option `{option}` needs an argument")
            }
            OptionProblem::BadArgument { option, message } => {
                write!(f, "bad argument for `{option}`: {message}")
            }
        }
    }
}

const RULES: &[OptionRule] = &[
    OptionRule {
        module: "minmax",
        long: "method",
        short: None,
        description: "solution method: vi/value-iteration or pi/policy-iteration",
        argument: Some(ArgumentType::String),
    },
    OptionRule {
        module: "minmax",
        long: "maxiter",
        short: Some("i"),
        description: "iteration budget before reporting divergence",
        argument: Some(ArgumentType::UnsignedInteger),
    },
    OptionRule {
        module: "minmax",
        long: "precision",
        short: None,
        description: "termination threshold, in (0, 1)",
        argument: Some(ArgumentType::Double),
    },
    OptionRule {
        module: "minmax",
        long: "absolute",
        short: None,
        description: "use absolute instead of relative convergence",
        argument: None,
    },
];

/// Solver settings assembled from the raw options.
#[derive(Debug, Clone, Default)]
pub struct SolverOptions {
    method: Option<SolutionMethod>,
    max_iterations: Option<usize>,
    precision: Option<f64>,
    absolute: bool,
}

impl SolverOptions {
    /// Overlay the parsed options on the solver defaults.
    pub fn minmax_settings(&self) -> MinMaxSettings {
        let mut settings = MinMaxSettings::default();
        if let Some(method) = self.method {
            settings.method = method;
        }
        if let Some(max_iterations) = self.max_iterations {
            settings.max_iterations = max_iterations;
        }
        if let Some(precision) = self.precision {
            settings.precision = precision;
        }
        if self.absolute {
            settings.criterion = ConvergenceCriterion::Absolute;
        }
        settings
    }
}

/// Split a raw token into its module prefix and option name, accepting
/// `--module:name`, `--name`, and `-short`.
fn split_token(token: &str) -> Option<(Option<&str>, &str)> {
    if let Some(stripped) = token.strip_prefix("--") {
        match stripped.split_once(':') {
            Some((module, name)) => Some((Some(module), name)),
            None => Some((None, stripped)),
        }
    } else {
        token.strip_prefix('-').map(|short| (None, short))
    }
}

/// Interpret a Boolean literal the way option files write them.
fn parse_bool(text: &str) -> Option<bool> {
    match text.to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Parse the raw trailing tokens into solver options, collecting every
/// problem instead of stopping at the first.
pub fn parse_solver_options(tokens: &[String]) -> Result<SolverOptions, Vec<OptionProblem>> {
    let mut options = SolverOptions::default();
    let mut problems = Vec::new();
    let mut stream = tokens.iter().peekable();

    while let Some(token) = stream.next() {
        let Some((module, name)) = split_token(token) else {
            problems.push(OptionProblem::UnknownOption(token.clone()));
            continue;
        };
        let Some(rule) = RULES.iter().find(|rule| rule.matches(module, name)) else {
            problems.push(OptionProblem::UnknownOption(token.clone()));
            continue;
        };
        let argument = match rule.argument {
            None => {
                // a flag may still take an explicit Boolean literal
                if let Some(next) = stream.peek() {
                    if let Some(value) = parse_bool(next) {
                        stream.next();
                        if rule.long == "absolute" {
                            options.absolute = value;
                        }
                        continue;
                    }
                }
                if rule.long == "absolute" {
                    options.absolute = true;
                }
                continue;
            }
            Some(argument) => argument,
        };
        let Some(value) = stream.next() else {
            problems.push(OptionProblem::MissingArgument(token.clone()));
            continue;
        };
        match (rule.long, argument) {
            ("method", ArgumentType::String) => match value.as_str() {
                "vi" | "value-iteration" => options.method = Some(SolutionMethod::ValueIteration),
                "pi" | "policy-iteration" => options.method = Some(SolutionMethod::PolicyIteration),
                other => problems.push(OptionProblem::BadArgument {
                    option: token.clone(),
                    message: format!("unknown method `{other}`"),
                }),
            },
            ("maxiter", ArgumentType::UnsignedInteger) => match value.parse::<usize>() {
                Ok(parsed) => options.max_iterations = Some(parsed),
                Err(error) => problems.push(OptionProblem::BadArgument {
                    option: token.clone(),
                    message: error.to_string(),
                }),
            },
            ("precision", ArgumentType::Double) => match value.parse::<f64>() {
                Ok(parsed) if parsed > 0.0 && parsed < 1.0 => {
                    options.precision = Some(parsed);
                }
                Ok(parsed) => problems.push(OptionProblem::BadArgument {
                    option: token.clone(),
                    message: format!("{parsed} is outside (0, 1)"),
                }),
                Err(error) => problems.push(OptionProblem::BadArgument {
                    option: token.clone(),
                    message: error.to_string(),
                }),
            },
            _ => unreachable!("rule table and match arms agree"),
        }
    }

    if problems.is_empty() {
        Ok(options)
    } else {
        Err(problems)
    }
}

/// One line per registered option, for `--help`-style output.
pub fn describe_options() -> String {
    let mut out = String::new();
    for rule in RULES {
        let short = rule
            .short
            .map(|short| format!(", -{short}"))
            .unwrap_or_default();
        out.push_str(&format!(
            "  --{}:{}{}  {}\n",
            rule.module, rule.long, short, rule.description
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|token| token.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let options = parse_solver_options(&[]).unwrap();
        let settings = options.minmax_settings();
        assert_eq!(settings.max_iterations, 20000);
        assert!((settings.precision - 1e-6).abs() < 1e-15);
        assert_eq!(settings.criterion, ConvergenceCriterion::Relative);
    }

    #[test]
    fn test_maxiter_and_absolute() {
        let options =
            parse_solver_options(&tokens(&["--minmax:maxiter", "5", "--minmax:absolute"]))
                .unwrap();
        let settings = options.minmax_settings();
        assert_eq!(settings.max_iterations, 5);
        assert_eq!(settings.criterion, ConvergenceCriterion::Absolute);
    }

    #[test]
    fn test_short_name_and_method() {
        let options = parse_solver_options(&tokens(&[
            "-i",
            "100",
            "--minmax:method",
            "policy-iteration",
        ]))
        .unwrap();
        let settings = options.minmax_settings();
        assert_eq!(settings.max_iterations, 100);
        assert_eq!(settings.method, SolutionMethod::PolicyIteration);
    }

    #[test]
    fn test_boolean_literals() {
        let options =
            parse_solver_options(&tokens(&["--minmax:absolute", "no"])).unwrap();
        assert_eq!(
            options.minmax_settings().criterion,
            ConvergenceCriterion::Relative
        );
        let options =
            parse_solver_options(&tokens(&["--minmax:absolute", "YES"])).unwrap();
        assert_eq!(
            options.minmax_settings().criterion,
            ConvergenceCriterion::Absolute
        );
    }

    #[test]
    fn test_collects_all_problems() {
        let problems = parse_solver_options(&tokens(&[
            "--minmax:stepsize",
            "--minmax:precision",
            "2.0",
            "--minmax:maxiter",
        ]))
        .unwrap_err();
        assert_eq!(problems.len(), 3);
        assert!(matches!(problems[0], OptionProblem::UnknownOption(_)));
        assert!(matches!(problems[1], OptionProblem::BadArgument { .. }));
        assert!(matches!(problems[2], OptionProblem::MissingArgument(_)));
    }

    #[test]
    fn test_budget_cut_diverges() {
        use checker::{check_properties, CheckSettings, PropertyStatus};
        use logic::parser::parse_properties;
        use models::parse_model;

        let transitions = "mdp\n0 0 0 0.9\n0 0 1 0.099\n0 0 2 0.001\n0 1 1 0.5\n0 1 2 0.5\n1 0 1 1.0\n2 0 2 1.0\n";
        let labels = "#DECLARATION\ninit one\n#END\n0 init\n1 one\n";
        let model = parse_model(transitions, labels, None, None, None).unwrap();
        let properties = parse_properties("Pmax=? [ F \"one\" ]\n").unwrap();

        let options = parse_solver_options(&tokens(&[
            "--minmax:maxiter",
            "5",
            "--minmax:absolute",
        ]))
        .unwrap();
        let settings = CheckSettings {
            minmax: options.minmax_settings(),
            ..CheckSettings::default()
        };
        let reports = check_properties(&model, &properties, &settings);
        assert!(matches!(
            reports[0].status,
            PropertyStatus::Diverged { iterations: 5 }
        ));
    }
}
