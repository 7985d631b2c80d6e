// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Render formulas back to their concrete property syntax.
//!
//! Printing a parsed formula and reparsing it yields the same AST, which the
//! diagnostics rely on when quoting offending subformulas.

use crate::syntax::*;
use itertools::Itertools;

/// Operator precedence levels, loosest first.
const IFF_IMPLIES: usize = 0;
const OR: usize = 1;
const AND: usize = 2;
const NOT: usize = 3;
const ATOM: usize = 4;

fn precedence(f: &StateFormula) -> usize {
    match f {
        StateFormula::Implies(..) | StateFormula::Iff(..) => IFF_IMPLIES,
        StateFormula::Or(_) => OR,
        StateFormula::And(_) => AND,
        StateFormula::Not(_) => NOT,
        _ => ATOM,
    }
}

fn parens(add: bool, s: String) -> String {
    if add {
        format!("({s})")
    } else {
        s
    }
}

fn bound_end(prefix_strict: &str, prefix: &str, end: &BoundEnd) -> String {
    if end.strict {
        format!("{prefix_strict}{}", end.value)
    } else {
        format!("{prefix}{}", end.value)
    }
}

fn time_bound(b: &TimeBound) -> String {
    let rm = match &b.reward_model {
        Some(name) => format!("{{\"{name}\"}}"),
        None => String::new(),
    };
    let ends = match (&b.lower, &b.upper) {
        (Some(l), Some(u)) => format!("[{},{}]", l.value, u.value),
        (None, Some(u)) => bound_end("<", "<=", u),
        (Some(l), None) => bound_end(">", ">=", l),
        (None, None) => String::new(),
    };
    format!("{rm}{ends}")
}

fn time_bounds(bounds: &[TimeBound]) -> String {
    bounds.iter().map(time_bound).join(",")
}

fn operator_suffix(direction: &Option<OptimizationDirection>, bound: &Option<Bound>) -> String {
    let dir = match direction {
        Some(d) => d.to_string(),
        None => String::new(),
    };
    let bound = match bound {
        Some(b) => format!("{}{}", b.comparison, b.threshold),
        None => "=?".to_string(),
    };
    format!("{dir}{bound}")
}

/// Render an atomic expression.
pub fn expression(e: &Expression) -> String {
    // loosest-binding first: comparisons, then +/-, then *
    fn prec(op: &ExprOp) -> usize {
        match op {
            op if op.is_comparison() => 0,
            ExprOp::Add | ExprOp::Sub => 1,
            ExprOp::Mul => 2,
            _ => unreachable!(),
        }
    }
    fn go(e: &Expression, level: usize) -> String {
        match e {
            Expression::Var(name) => name.clone(),
            Expression::Const(n) => n.to_string(),
            Expression::BinOp(op, lhs, rhs) => {
                let sym = match op {
                    ExprOp::Add => "+",
                    ExprOp::Sub => "-",
                    ExprOp::Mul => "*",
                    ExprOp::Eq => "=",
                    ExprOp::Ne => "!=",
                    ExprOp::Lt => "<",
                    ExprOp::Le => "<=",
                    ExprOp::Gt => ">",
                    ExprOp::Ge => ">=",
                };
                let p = prec(op);
                let s = format!("{} {} {}", go(lhs, p), sym, go(rhs, p + 1));
                parens(p < level, s)
            }
        }
    }
    go(e, 0)
}

/// Render a path formula.
pub fn path_formula(p: &PathFormula) -> String {
    match p {
        PathFormula::Next(f) => format!("X {}", state_formula(f)),
        PathFormula::Until { lhs, rhs, bounds } => format!(
            "{} U{} {}",
            with_precedence(lhs, ATOM),
            time_bounds(bounds),
            with_precedence(rhs, ATOM)
        ),
        PathFormula::Eventually { inner, bounds } => {
            format!("F{} {}", time_bounds(bounds), state_formula(inner))
        }
        PathFormula::Globally { inner, bounds } => {
            format!("G{} {}", time_bounds(bounds), state_formula(inner))
        }
        PathFormula::Cumulative { bounds } => format!("C{}", time_bounds(bounds)),
        PathFormula::Instant { time } => format!("I={time}"),
        PathFormula::LongRunReward => "LRA".to_string(),
        PathFormula::Conditional { path, condition } => {
            format!("{} || {}", path_formula(path), path_formula(condition))
        }
    }
}

fn with_precedence(f: &StateFormula, level: usize) -> String {
    parens(precedence(f) < level, state_formula(f))
}

/// Render a state formula.
pub fn state_formula(f: &StateFormula) -> String {
    match f {
        StateFormula::Literal(true) => "true".to_string(),
        StateFormula::Literal(false) => "false".to_string(),
        StateFormula::Label(name) => format!("\"{name}\""),
        StateFormula::Expression(e) => expression(e),
        StateFormula::Not(inner) => format!("!{}", with_precedence(inner, NOT)),
        StateFormula::And(fs) => fs.iter().map(|f| with_precedence(f, AND)).join(" & "),
        StateFormula::Or(fs) => fs.iter().map(|f| with_precedence(f, OR + 1)).join(" | "),
        StateFormula::Implies(lhs, rhs) => format!(
            "{} => {}",
            with_precedence(lhs, IFF_IMPLIES + 1),
            with_precedence(rhs, IFF_IMPLIES)
        ),
        StateFormula::Iff(lhs, rhs) => format!(
            "{} <=> {}",
            with_precedence(lhs, IFF_IMPLIES + 1),
            with_precedence(rhs, IFF_IMPLIES + 1)
        ),
        StateFormula::Probability {
            direction,
            bound,
            path,
        } => format!(
            "P{} [ {} ]",
            operator_suffix(direction, bound),
            path_formula(path)
        ),
        StateFormula::Reward {
            reward_model,
            direction,
            bound,
            path,
        } => {
            let rm = match reward_model {
                Some(name) => format!("{{\"{name}\"}}"),
                None => String::new(),
            };
            format!(
                "R{rm}{} [ {} ]",
                operator_suffix(direction, bound),
                path_formula(path)
            )
        }
        StateFormula::LongRunAverage {
            direction,
            bound,
            states,
        } => format!(
            "LRA{} [ {} ]",
            operator_suffix(direction, bound),
            state_formula(states)
        ),
        StateFormula::MultiObjective(fs) => {
            format!("multi({})", fs.iter().map(state_formula).join(", "))
        }
    }
}

/// Render a property, including its name prefix if it has one.
pub fn property(p: &Property) -> String {
    match &p.name {
        Some(name) => format!("\"{name}\": {}", state_formula(&p.formula)),
        None => state_formula(&p.formula),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn roundtrips(s: &str) {
        let f = parser::formula(s);
        let printed = state_formula(&f);
        assert_eq!(
            parser::formula(&printed),
            f,
            "printed formula `{printed}` should reparse to the same AST"
        );
    }

    #[test]
    fn test_roundtrip() {
        roundtrips("P<0.5 [ F \"goal\" ]");
        roundtrips("Pmax=? [ \"a\" U<=5 \"b\" ]");
        roundtrips("Pmin=? [ \"a\" & !\"b\" U \"c\" | \"d\" ]");
        roundtrips("R{\"energy\"}=? [ C<=10 ]");
        roundtrips("R=? [ I=7 ]");
        roundtrips("R=? [ LRA ]");
        roundtrips("LRA>=0.9 [ \"up\" ]");
        roundtrips("P=? [ F[2,5] \"goal\" ]");
        roundtrips("P=? [ F{\"energy\"}<4 \"goal\" ]");
        roundtrips("P=? [ F \"target\" || G \"alive\" ]");
        roundtrips("P>=1 [ F P<0.5 [ X \"a\" ] ]");
        roundtrips("multi(P>=0.5 [ F \"a\" ], P<0.1 [ F \"b\" ])");
        roundtrips("x + 1 < 4 & \"up\"");
        roundtrips("(\"a\" | \"b\") & \"c\" => \"d\"");
    }

    #[test]
    fn test_exact_text() {
        let f = parser::formula("P<0.5[F \"goal\"]");
        assert_eq!(state_formula(&f), "P<0.5 [ F \"goal\" ]");

        let f = parser::formula("! ( \"a\" & \"b\" )");
        assert_eq!(state_formula(&f), "!(\"a\" & \"b\")");
    }
}
