// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Parser for the property language.
//!
//! Properties are written one per line, optionally prefixed with a
//! `"name":` label, with `//` comments. The formula syntax follows the
//! usual probabilistic-logic conventions: `P<0.5 [ F "goal" ]`,
//! `Pmax=? [ "a" U<=5 "b" ]`, `R{"energy"}=? [ C<=10 ]`,
//! `LRA=? [ "up" ]`, `multi(...)`.

use crate::syntax::*;
use codespan_reporting::diagnostic::{Diagnostic, Label};
use peg::{error::ParseError, str::LineCol};

peg::parser! {

grammar parser() for str {
    use ComparisonType::*;
    use OptimizationDirection::*;

    rule ident_start() = ['a'..='z' | 'A'..='Z' | '_']
    rule ident_char() = ident_start() / ['0'..='9']
    pub(super) rule ident() -> String
    = s:$(quiet!{ident_start() ident_char()*} / expected!("identifier"))
    { s.to_string() }

    rule nl() = quiet!{ ['\n' | '\r'] } / expected!("newline")
    rule comment() = "//" [^'\n' | '\r']*
    rule ws_no_nl() = quiet!{ [' ' | '\t' ] }
    rule whitespace() = quiet! { ws_no_nl() / comment() / nl() }
    rule word_boundary() = !ident_char()
    rule _ = ws_no_nl()*
    rule __ = word_boundary() _

    rule string_literal() -> String
    = "\"" s:$([^'"']*) "\"" { s.to_string() }

    rule uint() -> u64
    = s:$(quiet!{['0'..='9']+} / expected!("number"))
    {? s.parse().or(Err("number")) }

    pub(super) rule number() -> f64
    = s:$(quiet!{"-"? ['0'..='9']+ ("." ['0'..='9']+)? (['e' | 'E'] ['-' | '+']? ['0'..='9']+)?}
          / expected!("number"))
    {? s.parse().or(Err("number")) }

    rule comparison() -> ComparisonType
    = "<=" { LessEqual } / "<" { Less } / ">=" { GreaterEqual } / ">" { Greater } / "=" { Equal }

    rule direction() -> OptimizationDirection
    = "min" { Minimize } / "max" { Maximize }

    // `=?` makes the operator a query; otherwise a comparison and threshold
    rule operator_bound() -> Option<Bound>
    = "=?" { None }
    / c:comparison() _ t:number() { Some(Bound::new(c, t)) }

    rule bound_end_spec() -> (Option<BoundEnd>, Option<BoundEnd>)
    = "<=" _ v:number() { (None, Some(BoundEnd { value: v, strict: false })) }
    / "<" _ v:number() { (None, Some(BoundEnd { value: v, strict: true })) }
    / ">=" _ v:number() { (Some(BoundEnd { value: v, strict: false }), None) }
    / ">" _ v:number() { (Some(BoundEnd { value: v, strict: true }), None) }
    / "[" _ l:number() _ "," _ u:number() _ "]" {
        (Some(BoundEnd { value: l, strict: false }), Some(BoundEnd { value: u, strict: false }))
      }

    rule time_bound() -> TimeBound
    = rm:("{" _ s:string_literal() _ "}" { s })? ends:bound_end_spec()
    { TimeBound { reward_model: rm, lower: ends.0, upper: ends.1 } }

    rule time_bounds() -> Vec<TimeBound>
    = time_bound() ++ (_ "," _)

    rule reward_model_name() -> String
    = "{" _ s:string_literal() _ "}" { s }

    rule base_path_formula() -> PathFormula
    = "X" __ f:state_formula() { PathFormula::Next(Box::new(f)) }
    / "F" bs:time_bounds()? __ f:state_formula()
      { PathFormula::Eventually { inner: Box::new(f), bounds: bs.unwrap_or_default() } }
    / "G" bs:time_bounds()? __ f:state_formula()
      { PathFormula::Globally { inner: Box::new(f), bounds: bs.unwrap_or_default() } }
    / "C" bs:time_bounds() { PathFormula::Cumulative { bounds: bs } }
    / "I" _ "=" _ t:number() { PathFormula::Instant { time: t } }
    / "LRA" word_boundary() { PathFormula::LongRunReward }
    / l:state_formula() _ "U" bs:time_bounds()? __ r:state_formula()
      { PathFormula::Until { lhs: Box::new(l), rhs: Box::new(r), bounds: bs.unwrap_or_default() } }

    pub(super) rule path_formula() -> PathFormula
    = p:base_path_formula() cond:(_ "||" _ c:base_path_formula() { c })?
    { match cond {
        Some(c) => PathFormula::Conditional { path: Box::new(p), condition: Box::new(c) },
        None => p,
      } }

    rule bracketed_path() -> PathFormula
    = "[" _ p:path_formula() _ "]" { p }

    rule operator_formula() -> StateFormula
    = "multi" _ "(" _ fs:(state_formula() ** (_ "," _)) _ ")"
      { StateFormula::MultiObjective(fs) }
    / "P" d:direction()? b:operator_bound() _ p:bracketed_path()
      { StateFormula::Probability { direction: d, bound: b, path: Box::new(p) } }
    / "R" rm:reward_model_name()? d:direction()? b:operator_bound() _ p:bracketed_path()
      { StateFormula::Reward { reward_model: rm, direction: d, bound: b, path: Box::new(p) } }
    / "LRA" d:direction()? b:operator_bound() _ "[" _ f:state_formula() _ "]"
      { StateFormula::LongRunAverage { direction: d, bound: b, states: Box::new(f) } }

    rule expr_op() -> ExprOp
    = "!=" { ExprOp::Ne } / "<=" { ExprOp::Le } / "<" { ExprOp::Lt }
    / ">=" { ExprOp::Ge } / ">" { ExprOp::Gt } / "=" { ExprOp::Eq }

    rule const_expr() -> Expression
    = n:$(['0'..='9']+) {? n.parse().map(Expression::Const).or(Err("number")) }

    rule int_expr() -> Expression = precedence!{
        x:(@) _ "+" _ y:@ { Expression::binop(ExprOp::Add, x, y) }
        x:(@) _ "-" _ y:@ { Expression::binop(ExprOp::Sub, x, y) }
        --
        x:(@) _ "*" _ y:@ { Expression::binop(ExprOp::Mul, x, y) }
        --
        e:const_expr() { e }
        v:ident() { Expression::Var(v) }
        "(" _ e:int_expr() _ ")" { e }
    }

    // comparisons of integer expressions, e.g. `x + 1 < 4`
    rule expression_atom() -> StateFormula
    = l:int_expr() _ op:expr_op() _ r:int_expr()
    { StateFormula::Expression(Expression::binop(op, l, r)) }

    pub(super) rule state_formula() -> StateFormula = precedence!{
        x:@ _ "=>" _ y:(@) { StateFormula::implies(x, y) }
        x:(@) _ "<=>" _ y:@ { StateFormula::iff(x, y) }
        --
        x:(@) _ "|" _ y:@ { StateFormula::or([x, y]) }
        --
        x:(@) _ "&" _ y:@ { StateFormula::and([x, y]) }
        --
        "!" _ x:@ { StateFormula::not(x) }
        --
        f:operator_formula() { f }
        "true" word_boundary() { StateFormula::true_() }
        "false" word_boundary() { StateFormula::false_() }
        f:expression_atom() { f }
        l:string_literal() { StateFormula::Label(l) }
        s:ident() { StateFormula::Label(s) }
        "(" _ f:state_formula() _ ")" { f }
    }

    rule property() -> (Option<String>, usize, StateFormula, usize)
    = name:(n:string_literal() _ ":" _ { n })?
      start:position!() f:state_formula() end:position!()
    { (name, start, f, end) }

    // matches whitespace with at least one newline
    rule newline_separator()
    = quiet!{ ws_no_nl()* comment()? nl() (whitespace())* } / expected!("newline separator")

    rule newline_separated<T>(e: rule<T>) -> Vec<T>
    = e() ** newline_separator()

    pub(super) rule properties() -> Vec<(Option<String>, usize, StateFormula, usize)>
    = (whitespace())* ps:newline_separated(<property()>) (whitespace())* { ps }
  }
}

/// Parse a single formula, panicking on failure. For tests.
pub fn formula(s: &str) -> StateFormula {
    parser::state_formula(s).expect("test formula should parse")
}

/// Parse a single path formula, panicking on failure. For tests.
pub fn path_formula(s: &str) -> PathFormula {
    parser::path_formula(s).expect("test path formula should parse")
}

/// Parse a single formula.
pub fn parse_formula(s: &str) -> Result<StateFormula, ParseError<LineCol>> {
    parser::state_formula(s.trim())
}

/// Parse a properties file: one property per line, `//` comments, optional
/// `"name":` prefixes. The text of each property is kept as its description.
pub fn parse_properties(s: &str) -> Result<Vec<Property>, ParseError<LineCol>> {
    let parsed = parser::properties(s)?;
    Ok(parsed
        .into_iter()
        .map(|(name, start, formula, end)| Property {
            name,
            description: s[start..end].trim().to_string(),
            formula,
        })
        .collect())
}

/// Convert an opaque FileId and error to a readable `Diagnostic`
pub fn parse_error_diagnostic<FileId>(
    file_id: FileId,
    e: &ParseError<LineCol>,
) -> Diagnostic<FileId> {
    Diagnostic::error()
        .with_message("could not parse property")
        .with_labels(vec![Label::primary(
            file_id,
            e.location.offset..e.location.offset + 1,
        )
        .with_message(format!("expected {}", e.expected))])
}

#[cfg(test)]
mod tests {
    use super::{formula, parse_properties, parser, path_formula};
    use crate::syntax::*;

    #[test]
    fn test_ident() {
        assert_eq!(&parser::ident("hello").unwrap(), "hello");
        assert_eq!(&parser::ident("_goal2").unwrap(), "_goal2");
        assert!(parser::ident("2up").is_err());
    }

    #[test]
    fn test_number() {
        assert_eq!(parser::number("0.5").unwrap(), 0.5);
        assert_eq!(parser::number("1e-6").unwrap(), 1e-6);
        assert_eq!(parser::number("20000").unwrap(), 20000.0);
        assert!(parser::number("x").is_err());
    }

    #[test]
    fn test_probability_operator() {
        let f = formula("P<0.5 [ F \"goal\" ]");
        match f {
            StateFormula::Probability {
                direction: None,
                bound: Some(b),
                path,
            } => {
                assert_eq!(b.comparison, ComparisonType::Less);
                assert_eq!(b.threshold, 0.5);
                assert!(matches!(*path, PathFormula::Eventually { .. }));
            }
            _ => panic!("wrong shape: {f:?}"),
        }

        let f = formula("Pmax=? [ \"a\" U \"b\" ]");
        match f {
            StateFormula::Probability {
                direction: Some(OptimizationDirection::Maximize),
                bound: None,
                ..
            } => {}
            _ => panic!("wrong shape: {f:?}"),
        }
    }

    #[test]
    fn test_bounded_until() {
        let f = path_formula("\"a\" U<=5 \"b\"");
        match f {
            PathFormula::Until { bounds, .. } => {
                assert_eq!(bounds.len(), 1);
                assert!(bounds[0].is_step_bound());
                assert_eq!(
                    bounds[0].upper,
                    Some(BoundEnd {
                        value: 5.0,
                        strict: false
                    })
                );
                assert_eq!(bounds[0].lower, None);
            }
            _ => panic!("wrong shape: {f:?}"),
        }

        // reward-bounded and multi-dimensional
        let f = path_formula("\"a\" U{\"energy\"}<=4,{\"fuel\"}>=2 \"b\"");
        match f {
            PathFormula::Until { bounds, .. } => {
                assert_eq!(bounds.len(), 2);
                assert_eq!(bounds[0].reward_model.as_deref(), Some("energy"));
                assert_eq!(bounds[1].reward_model.as_deref(), Some("fuel"));
                assert!(bounds[1].upper.is_none());
            }
            _ => panic!("wrong shape: {f:?}"),
        }

        // interval bounds are inclusive on both ends
        let f = path_formula("\"a\" U[2,5] \"b\"");
        match f {
            PathFormula::Until { bounds, .. } => {
                assert_eq!(bounds[0].lower.unwrap().value, 2.0);
                assert_eq!(bounds[0].upper.unwrap().value, 5.0);
                assert!(!bounds[0].lower.unwrap().strict);
            }
            _ => panic!("wrong shape: {f:?}"),
        }
    }

    #[test]
    fn test_reward_operator() {
        let f = formula("R{\"energy\"}=? [ C<=10 ]");
        match f {
            StateFormula::Reward {
                reward_model: Some(rm),
                bound: None,
                path,
                ..
            } => {
                assert_eq!(rm, "energy");
                assert!(matches!(*path, PathFormula::Cumulative { .. }));
            }
            _ => panic!("wrong shape: {f:?}"),
        }

        let f = formula("Rmin=? [ I=7 ]");
        assert!(matches!(
            f,
            StateFormula::Reward {
                direction: Some(OptimizationDirection::Minimize),
                ..
            }
        ));

        let f = formula("R=? [ LRA ]");
        match f {
            StateFormula::Reward { path, .. } => {
                assert_eq!(*path, PathFormula::LongRunReward)
            }
            _ => panic!("wrong shape: {f:?}"),
        }
    }

    #[test]
    fn test_boolean_structure() {
        // | binds looser than &
        assert_eq!(formula("a | b & c"), formula("a | (b & c)"));
        // => is right-associative and binds loosest
        assert_eq!(formula("a => b => c"), formula("a => (b => c)"));
        // bare identifiers and quoted strings both make labels
        assert_eq!(formula("goal"), formula("\"goal\""));
        // negation
        assert_eq!(
            formula("!!goal"),
            StateFormula::label("goal"),
            "double negation should cancel"
        );
    }

    #[test]
    fn test_expression_atoms() {
        let f = formula("x + 1 < 4");
        match f {
            StateFormula::Expression(Expression::BinOp(ExprOp::Lt, l, r)) => {
                assert_eq!(
                    *l,
                    Expression::binop(ExprOp::Add, Expression::var("x"), Expression::Const(1))
                );
                assert_eq!(*r, Expression::Const(4));
            }
            _ => panic!("wrong shape: {f:?}"),
        }
    }

    #[test]
    fn test_conditional() {
        let f = path_formula("F \"target\" || G \"alive\"");
        assert!(matches!(f, PathFormula::Conditional { .. }));
    }

    #[test]
    fn test_multi_objective() {
        let f = formula("multi(P>=0.5 [ F \"a\" ], R{\"r\"}<=4 [ F \"b\" ])");
        match f {
            StateFormula::MultiObjective(fs) => assert_eq!(fs.len(), 2),
            _ => panic!("wrong shape: {f:?}"),
        }
    }

    #[test]
    fn test_nested_operator() {
        let f = formula("P=? [ F P>=1 [ X \"done\" ] ]");
        match f {
            StateFormula::Probability { path, .. } => match *path {
                PathFormula::Eventually { inner, .. } => assert!(inner.is_operator()),
                _ => panic!("expected eventually"),
            },
            _ => panic!("wrong shape: {f:?}"),
        }
    }

    #[test]
    fn test_properties_file() {
        let text = r#"
// two reachability questions and a named one
P=? [ F "goal" ]
"safe": P<0.1 [ true U<=20 "error" ]

Pmin=? [ X "up" ] // trailing comment
"#;
        let props = parse_properties(text).expect("test properties should parse");
        assert_eq!(props.len(), 3);
        assert_eq!(props[0].name, None);
        assert_eq!(props[1].name.as_deref(), Some("safe"));
        assert_eq!(props[1].description, "P<0.1 [ true U<=20 \"error\" ]");
        assert!(matches!(
            props[2].formula,
            StateFormula::Probability {
                direction: Some(OptimizationDirection::Minimize),
                ..
            }
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parser::state_formula("P<0.5 [ F ]").is_err());
        assert!(parser::state_formula("P [ F goal ]").is_err());
        assert!(parser::state_formula("F goal U done").is_err());
    }
}
