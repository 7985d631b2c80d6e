// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The AST for state and path formulas.

use std::fmt;

use itertools::Itertools;
use serde::Serialize;

/// Direction of optimization over the schedulers of a nondeterministic model.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, Serialize)]
pub enum OptimizationDirection {
    /// Choose actions so the computed value becomes as small as possible
    Minimize,
    /// Choose actions so the computed value becomes as large as possible
    Maximize,
}

impl fmt::Display for OptimizationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationDirection::Minimize => write!(f, "min"),
            OptimizationDirection::Maximize => write!(f, "max"),
        }
    }
}

/// Comparison relation of a probability or reward bound.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, Serialize)]
pub enum ComparisonType {
    /// Strictly less than the threshold
    Less,
    /// At most the threshold
    LessEqual,
    /// Strictly greater than the threshold
    Greater,
    /// At least the threshold
    GreaterEqual,
    /// Exactly the threshold
    Equal,
}

impl ComparisonType {
    /// Whether the comparison excludes the threshold itself.
    pub fn is_strict(&self) -> bool {
        matches!(self, ComparisonType::Less | ComparisonType::Greater)
    }

    /// Whether the comparison puts the threshold below the admissible values.
    pub fn is_lower_bound(&self) -> bool {
        matches!(self, ComparisonType::Greater | ComparisonType::GreaterEqual)
    }

    /// Evaluate `value <cmp> threshold`.
    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonType::Less => value < threshold,
            ComparisonType::LessEqual => value <= threshold,
            ComparisonType::Greater => value > threshold,
            ComparisonType::GreaterEqual => value >= threshold,
            ComparisonType::Equal => value == threshold,
        }
    }
}

impl fmt::Display for ComparisonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComparisonType::Less => "<",
            ComparisonType::LessEqual => "<=",
            ComparisonType::Greater => ">",
            ComparisonType::GreaterEqual => ">=",
            ComparisonType::Equal => "=",
        };
        write!(f, "{s}")
    }
}

/// A threshold a computed probability or expected reward is compared against,
/// as in `P<0.3 [...]`.
#[derive(PartialEq, Clone, Copy, Debug, Serialize)]
pub struct Bound {
    /// How the computed value relates to the threshold
    pub comparison: ComparisonType,
    /// The threshold itself
    pub threshold: f64,
}

impl Bound {
    /// Smart constructor, mainly here for uniformity.
    pub fn new(comparison: ComparisonType, threshold: f64) -> Self {
        Bound {
            comparison,
            threshold,
        }
    }

    /// Whether a probability bound can be decided from the qualitative
    /// probability-0 and probability-1 state sets alone.
    pub fn is_qualitative_probability(&self) -> bool {
        self.threshold == 0.0 || self.threshold == 1.0
    }

    /// The direction that makes checking the bound conservative over all
    /// schedulers. Upper bounds need the maximum, lower bounds the minimum,
    /// and an exact bound determines no direction.
    pub fn inferred_direction(&self) -> Option<OptimizationDirection> {
        match self.comparison {
            ComparisonType::Less | ComparisonType::LessEqual => {
                Some(OptimizationDirection::Maximize)
            }
            ComparisonType::Greater | ComparisonType::GreaterEqual => {
                Some(OptimizationDirection::Minimize)
            }
            ComparisonType::Equal => None,
        }
    }

    /// Evaluate the bound against a computed value.
    pub fn check(&self, value: f64) -> bool {
        self.comparison.evaluate(value, self.threshold)
    }
}

/// One end of a bound on a path operator.
#[derive(PartialEq, Clone, Copy, Debug, Serialize)]
pub struct BoundEnd {
    /// The boundary value
    pub value: f64,
    /// Whether the boundary value itself is excluded
    pub strict: bool,
}

/// One dimension of the bound on a path operator, as in `U{"energy"}<=4`.
///
/// A dimension without a reward model counts steps (or time, on
/// continuous-time models). Interval syntax `[l,u]` yields inclusive ends.
#[derive(PartialEq, Clone, Debug, Serialize)]
pub struct TimeBound {
    /// Reward model whose accumulation the bound restricts; `None` counts steps
    pub reward_model: Option<String>,
    /// Lower end, if any
    pub lower: Option<BoundEnd>,
    /// Upper end, if any
    pub upper: Option<BoundEnd>,
}

impl TimeBound {
    /// An upper step bound `<= steps`.
    pub fn upper_steps(steps: u64) -> Self {
        TimeBound {
            reward_model: None,
            lower: None,
            upper: Some(BoundEnd {
                value: steps as f64,
                strict: false,
            }),
        }
    }

    /// An upper bound on a named reward model.
    pub fn upper_reward(reward_model: &str, value: f64, strict: bool) -> Self {
        TimeBound {
            reward_model: Some(reward_model.to_string()),
            lower: None,
            upper: Some(BoundEnd { value, strict }),
        }
    }

    /// Whether the dimension counts steps rather than a reward.
    pub fn is_step_bound(&self) -> bool {
        self.reward_model.is_none()
    }
}

/// Binary operators of atomic expressions
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, Serialize)]
pub enum ExprOp {
    Add,
    Sub,
    Mul,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ExprOp {
    /// Whether the operator yields a Boolean rather than an integer.
    pub fn is_comparison(&self) -> bool {
        !matches!(self, ExprOp::Add | ExprOp::Sub | ExprOp::Mul)
    }
}

/// An arithmetic expression over integer-valued model variables, used in
/// atomic expression formulas such as `x + 1 < 4`.
#[derive(PartialEq, Clone, Debug, Serialize)]
pub enum Expression {
    /// A reference to a model variable
    Var(String),
    /// An integer constant
    Const(i64),
    /// An applied binary operation
    BinOp(ExprOp, Box<Expression>, Box<Expression>),
}

impl Expression {
    /// Smart constructor for Var
    pub fn var(name: &str) -> Self {
        Self::Var(name.to_string())
    }

    /// Smart constructor for a binary operation
    pub fn binop(op: ExprOp, lhs: Expression, rhs: Expression) -> Self {
        Self::BinOp(op, Box::new(lhs), Box::new(rhs))
    }
}

/// A formula interpreted over the paths of a model. Path formulas only occur
/// under a probability or reward operator.
#[derive(PartialEq, Clone, Debug, Serialize)]
pub enum PathFormula {
    /// The successor state satisfies the subformula
    Next(Box<StateFormula>),
    /// `lhs` holds until `rhs` holds, within the given bounds (empty bounds
    /// mean the unbounded until)
    Until {
        /// Invariant holding before the goal is reached
        lhs: Box<StateFormula>,
        /// Goal formula
        rhs: Box<StateFormula>,
        /// Bound dimensions, conjunctively
        bounds: Vec<TimeBound>,
    },
    /// Some state satisfying the subformula is eventually reached
    Eventually {
        /// Goal formula
        inner: Box<StateFormula>,
        /// Bound dimensions, conjunctively
        bounds: Vec<TimeBound>,
    },
    /// The subformula holds along the whole path
    Globally {
        /// Invariant formula
        inner: Box<StateFormula>,
        /// Bound dimensions, conjunctively
        bounds: Vec<TimeBound>,
    },
    /// Reward accumulated up to the bound (only under a reward operator)
    Cumulative {
        /// Bound dimensions; at least one is required
        bounds: Vec<TimeBound>,
    },
    /// State reward observed at exactly the given instant (only under a
    /// reward operator)
    Instant {
        /// Step count or time point
        time: f64,
    },
    /// Long-run average reward (only under a reward operator)
    LongRunReward,
    /// Probability of `path` under the condition that `condition` holds
    Conditional {
        /// Path formula whose probability is asked for
        path: Box<PathFormula>,
        /// Conditioning path formula
        condition: Box<PathFormula>,
    },
}

impl PathFormula {
    /// Smart constructor for Next
    pub fn next<T: Into<StateFormula>>(inner: T) -> Self {
        Self::Next(Box::new(inner.into()))
    }

    /// Smart constructor for the unbounded until
    pub fn until<T1, T2>(lhs: T1, rhs: T2) -> Self
    where
        T1: Into<StateFormula>,
        T2: Into<StateFormula>,
    {
        Self::Until {
            lhs: Box::new(lhs.into()),
            rhs: Box::new(rhs.into()),
            bounds: vec![],
        }
    }

    /// Smart constructor for a bounded until
    pub fn bounded_until<T1, T2>(lhs: T1, rhs: T2, bounds: Vec<TimeBound>) -> Self
    where
        T1: Into<StateFormula>,
        T2: Into<StateFormula>,
    {
        Self::Until {
            lhs: Box::new(lhs.into()),
            rhs: Box::new(rhs.into()),
            bounds,
        }
    }

    /// Smart constructor for the unbounded eventually
    pub fn eventually<T: Into<StateFormula>>(inner: T) -> Self {
        Self::Eventually {
            inner: Box::new(inner.into()),
            bounds: vec![],
        }
    }

    /// Smart constructor for a bounded eventually
    pub fn bounded_eventually<T: Into<StateFormula>>(inner: T, bounds: Vec<TimeBound>) -> Self {
        Self::Eventually {
            inner: Box::new(inner.into()),
            bounds,
        }
    }

    /// Smart constructor for the unbounded globally
    pub fn globally<T: Into<StateFormula>>(inner: T) -> Self {
        Self::Globally {
            inner: Box::new(inner.into()),
            bounds: vec![],
        }
    }

    /// The bound dimensions attached to this path formula, if it carries any.
    pub fn bounds(&self) -> &[TimeBound] {
        match self {
            PathFormula::Until { bounds, .. }
            | PathFormula::Eventually { bounds, .. }
            | PathFormula::Globally { bounds, .. }
            | PathFormula::Cumulative { bounds } => bounds,
            _ => &[],
        }
    }

    /// Remove all bound dimensions, turning bounded variants into their
    /// unbounded counterparts. Cumulative and instant formulas are unchanged
    /// since their bound is their meaning.
    pub fn strip_bounds(&self) -> PathFormula {
        match self {
            PathFormula::Until { lhs, rhs, .. } => PathFormula::Until {
                lhs: lhs.clone(),
                rhs: rhs.clone(),
                bounds: vec![],
            },
            PathFormula::Eventually { inner, .. } => PathFormula::Eventually {
                inner: inner.clone(),
                bounds: vec![],
            },
            PathFormula::Globally { inner, .. } => PathFormula::Globally {
                inner: inner.clone(),
                bounds: vec![],
            },
            f => f.clone(),
        }
    }
}

/// A formula interpreted over the states of a model.
///
/// The syntax is a closed sum: every construct the checker can ever see is a
/// variant here, and engines declare which subset they handle through a
/// fragment. Probability and reward operators carry an optional
/// optimization direction and an optional bound; an operator with neither is
/// a quantitative query (`P=?`).
#[derive(PartialEq, Clone, Debug, Serialize)]
pub enum StateFormula {
    /// A constant true or false
    Literal(bool),
    /// An atomic label, matched against the model's state labeling
    Label(String),
    /// An atomic expression over model variables
    Expression(Expression),
    /// Boolean negation
    Not(Box<StateFormula>),
    /// Conjunction over two or more subformulas
    And(Vec<StateFormula>),
    /// Disjunction over two or more subformulas
    Or(Vec<StateFormula>),
    /// Implication
    Implies(Box<StateFormula>, Box<StateFormula>),
    /// Equivalence
    Iff(Box<StateFormula>, Box<StateFormula>),
    /// Probability operator `P`
    Probability {
        /// Direction over schedulers, if written explicitly (`Pmax`)
        direction: Option<OptimizationDirection>,
        /// Probability bound; `None` makes this a quantitative query
        bound: Option<Bound>,
        /// The path formula whose probability is measured
        path: Box<PathFormula>,
    },
    /// Expected-reward operator `R`
    Reward {
        /// Name of the reward model; `None` selects the model's only one
        reward_model: Option<String>,
        /// Direction over schedulers, if written explicitly
        direction: Option<OptimizationDirection>,
        /// Reward bound; `None` makes this a quantitative query
        bound: Option<Bound>,
        /// The path formula the reward is accumulated along
        path: Box<PathFormula>,
    },
    /// Long-run-average operator `LRA` over a state set
    LongRunAverage {
        /// Direction over schedulers, if written explicitly
        direction: Option<OptimizationDirection>,
        /// Bound on the long-run average; `None` makes this a query
        bound: Option<Bound>,
        /// The states whose long-run share of time is measured
        states: Box<StateFormula>,
    },
    /// Multi-objective wrapper `multi(...)` over operator formulas
    MultiObjective(Vec<StateFormula>),
}

impl From<&StateFormula> for StateFormula {
    /// This is mostly for smart constructors, making it possible to pass
    /// either StateFormula or &StateFormula with an automatic clone if needed
    fn from(value: &Self) -> Self {
        value.clone()
    }
}

/// Smart constructors for StateFormula. These generally take arguments by
/// value and box them as needed.
impl StateFormula {
    /// Smart constructor for Literal. Mainly here for uniformity.
    pub fn literal(value: bool) -> Self {
        Self::Literal(value)
    }

    /// Smart constructor for Literal(true)
    pub fn true_() -> Self {
        Self::Literal(true)
    }

    /// Smart constructor for Literal(false)
    pub fn false_() -> Self {
        Self::Literal(false)
    }

    /// Smart constructor for Label
    pub fn label(name: &str) -> Self {
        Self::Label(name.to_string())
    }

    /// Smart constructor for not. Cancels double negation.
    pub fn not<T: Into<StateFormula>>(f: T) -> Self {
        match f.into() {
            Self::Not(inner) => *inner,
            Self::Literal(b) => Self::Literal(!b),
            f => Self::Not(Box::new(f)),
        }
    }

    /// Helper function for [`Self::and`] and [`Self::or`]
    fn flatten_and(fs: Vec<StateFormula>) -> Vec<StateFormula> {
        fs.into_iter()
            .flat_map(|f| match f {
                Self::And(fs2) => fs2,
                _ => vec![f],
            })
            .collect()
    }

    fn flatten_or(fs: Vec<StateFormula>) -> Vec<StateFormula> {
        fs.into_iter()
            .flat_map(|f| match f {
                Self::Or(fs2) => fs2,
                _ => vec![f],
            })
            .collect()
    }

    /// Smart constructor for And. Zero and one conjuncts are handled
    /// specially, and conjuncts that are And are flattened (but not
    /// recursively).
    pub fn and<I>(fs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<StateFormula>,
    {
        let mut fs = fs.into_iter().map(|f| f.into()).collect_vec();
        if fs.is_empty() {
            Self::true_()
        } else if fs.len() == 1 {
            fs.pop().unwrap()
        } else {
            Self::And(Self::flatten_and(fs))
        }
    }

    /// Smart constructor for Or. Zero and one disjuncts are handled
    /// specially, and disjuncts that are Or are flattened (but not
    /// recursively).
    pub fn or<I>(fs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<StateFormula>,
    {
        let mut fs = fs.into_iter().map(|f| f.into()).collect_vec();
        if fs.is_empty() {
            Self::false_()
        } else if fs.len() == 1 {
            fs.pop().unwrap()
        } else {
            Self::Or(Self::flatten_or(fs))
        }
    }

    /// Smart constructor for `lhs => rhs`
    pub fn implies<T1, T2>(lhs: T1, rhs: T2) -> Self
    where
        T1: Into<StateFormula>,
        T2: Into<StateFormula>,
    {
        Self::Implies(Box::new(lhs.into()), Box::new(rhs.into()))
    }

    /// Smart constructor for `lhs <=> rhs`
    pub fn iff<T1, T2>(lhs: T1, rhs: T2) -> Self
    where
        T1: Into<StateFormula>,
        T2: Into<StateFormula>,
    {
        Self::Iff(Box::new(lhs.into()), Box::new(rhs.into()))
    }

    /// Smart constructor for a probability operator.
    pub fn probability(
        direction: Option<OptimizationDirection>,
        bound: Option<Bound>,
        path: PathFormula,
    ) -> Self {
        Self::Probability {
            direction,
            bound,
            path: Box::new(path),
        }
    }

    /// Smart constructor for the quantitative query `P=? [path]`.
    pub fn prob_query(path: PathFormula) -> Self {
        Self::probability(None, None, path)
    }

    /// Smart constructor for a bounded probability operator `P<cmp><t> [path]`.
    pub fn prob_bound(comparison: ComparisonType, threshold: f64, path: PathFormula) -> Self {
        Self::probability(None, Some(Bound::new(comparison, threshold)), path)
    }

    /// Smart constructor for a reward operator.
    pub fn reward(
        reward_model: Option<&str>,
        direction: Option<OptimizationDirection>,
        bound: Option<Bound>,
        path: PathFormula,
    ) -> Self {
        Self::Reward {
            reward_model: reward_model.map(|s| s.to_string()),
            direction,
            bound,
            path: Box::new(path),
        }
    }

    /// Smart constructor for the quantitative query `R=? [path]`.
    pub fn reward_query(reward_model: Option<&str>, path: PathFormula) -> Self {
        Self::reward(reward_model, None, None, path)
    }

    /// Whether this formula is a probability, reward, or long-run-average
    /// operator (the shapes a check task can be built from).
    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            StateFormula::Probability { .. }
                | StateFormula::Reward { .. }
                | StateFormula::LongRunAverage { .. }
        )
    }

    /// The bound attached to the outermost operator, if there is one.
    pub fn operator_bound(&self) -> Option<&Bound> {
        match self {
            StateFormula::Probability { bound, .. }
            | StateFormula::Reward { bound, .. }
            | StateFormula::LongRunAverage { bound, .. } => bound.as_ref(),
            _ => None,
        }
    }

    /// Return the number of atomic formulas in the formula.
    pub fn size(&self) -> usize {
        match self {
            StateFormula::Literal(_) | StateFormula::Label(_) | StateFormula::Expression(_) => 1,
            StateFormula::Not(f) => f.size(),
            StateFormula::And(fs) | StateFormula::Or(fs) | StateFormula::MultiObjective(fs) => {
                fs.iter().map(StateFormula::size).sum()
            }
            StateFormula::Implies(lhs, rhs) | StateFormula::Iff(lhs, rhs) => {
                lhs.size() + rhs.size()
            }
            StateFormula::Probability { path, .. } | StateFormula::Reward { path, .. } => {
                path.size()
            }
            StateFormula::LongRunAverage { states, .. } => states.size(),
        }
    }
}

impl PathFormula {
    /// Return the number of atomic formulas in the formula.
    pub fn size(&self) -> usize {
        match self {
            PathFormula::Next(f) => f.size(),
            PathFormula::Until { lhs, rhs, .. } => lhs.size() + rhs.size(),
            PathFormula::Eventually { inner, .. } | PathFormula::Globally { inner, .. } => {
                inner.size()
            }
            PathFormula::Cumulative { .. }
            | PathFormula::Instant { .. }
            | PathFormula::LongRunReward => 1,
            PathFormula::Conditional { path, condition } => path.size() + condition.size(),
        }
    }
}

/// A named property: one line of a properties file.
#[derive(PartialEq, Clone, Debug, Serialize)]
pub struct Property {
    /// Optional name given as a `"name":` prefix
    pub name: Option<String>,
    /// The property text as written in the source
    pub description: String,
    /// The parsed formula
    pub formula: StateFormula,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smart_constructors() {
        let a = StateFormula::label("a");
        let b = StateFormula::label("b");

        // double negation cancels
        assert_eq!(StateFormula::not(StateFormula::not(a.clone())), a);
        assert_eq!(StateFormula::not(StateFormula::true_()), StateFormula::false_());

        // zero and one conjuncts are special-cased
        assert_eq!(StateFormula::and::<Vec<StateFormula>>(vec![]), StateFormula::true_());
        assert_eq!(StateFormula::and(vec![a.clone()]), a);

        // nested conjunctions are flattened one level
        let ab = StateFormula::and(vec![a.clone(), b.clone()]);
        assert_eq!(
            StateFormula::and(vec![ab, a.clone()]),
            StateFormula::And(vec![a.clone(), b.clone(), a.clone()])
        );
    }

    #[test]
    fn test_inferred_direction() {
        use OptimizationDirection::*;
        let bound = |c| Bound::new(c, 0.5);
        assert_eq!(bound(ComparisonType::Less).inferred_direction(), Some(Maximize));
        assert_eq!(bound(ComparisonType::LessEqual).inferred_direction(), Some(Maximize));
        assert_eq!(bound(ComparisonType::Greater).inferred_direction(), Some(Minimize));
        assert_eq!(bound(ComparisonType::GreaterEqual).inferred_direction(), Some(Minimize));
        assert_eq!(bound(ComparisonType::Equal).inferred_direction(), None);
    }

    #[test]
    fn test_qualitative_bounds() {
        assert!(Bound::new(ComparisonType::GreaterEqual, 1.0).is_qualitative_probability());
        assert!(Bound::new(ComparisonType::LessEqual, 0.0).is_qualitative_probability());
        assert!(!Bound::new(ComparisonType::Less, 0.5).is_qualitative_probability());
    }

    #[test]
    fn test_strip_bounds() {
        let bounded = PathFormula::bounded_until(
            StateFormula::true_(),
            StateFormula::label("goal"),
            vec![TimeBound::upper_steps(5)],
        );
        let unbounded = PathFormula::until(StateFormula::true_(), StateFormula::label("goal"));
        assert_eq!(bounded.strip_bounds(), unbounded);
    }
}
