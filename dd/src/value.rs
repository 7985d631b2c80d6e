// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Constant leaf values of multi-terminal diagrams.
//!
//! Every terminal of a value diagram holds one [`Value`]. Equality and
//! hashing are structural so that values can be interned: doubles compare by
//! bit pattern, which keeps interning total but distinguishes `0.0` from
//! `-0.0` and one NaN payload from another. Arithmetic comparison, in
//! contrast, is numeric.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::manager::DdError;

/// The kind of a [`Value`]. Binary operations require both operands to have
/// the same kind; a mismatch is reported, never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Truth values, used by 0/1 diagrams converted from Boolean ones.
    Boolean,
    /// Signed 64-bit integers.
    Integer,
    /// IEEE 754 doubles.
    Double,
    /// Arbitrary-precision rationals.
    Rational,
    /// Closed intervals of doubles.
    Interval,
    /// Rational functions over named parameters.
    Function,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Boolean => write!(f, "boolean"),
            ValueKind::Integer => write!(f, "integer"),
            ValueKind::Double => write!(f, "double"),
            ValueKind::Rational => write!(f, "rational"),
            ValueKind::Interval => write!(f, "interval"),
            ValueKind::Function => write!(f, "function"),
        }
    }
}

/// A closed interval `[lower, upper]` of doubles.
#[derive(Debug, Clone, Copy)]
pub struct Interval {
    /// Lower end, inclusive.
    pub lower: f64,
    /// Upper end, inclusive.
    pub upper: f64,
}

impl Interval {
    /// Creates the interval `[lower, upper]`.
    pub fn new(lower: f64, upper: f64) -> Self {
        Interval { lower, upper }
    }

    /// The point interval `[value, value]`.
    pub fn point(value: f64) -> Self {
        Interval::new(value, value)
    }

    fn contains_zero(&self) -> bool {
        self.lower <= 0.0 && self.upper >= 0.0
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

/// A monomial: variable names mapped to positive powers.
type Monomial = BTreeMap<String, u32>;

/// A multivariate polynomial with rational coefficients, kept in a canonical
/// sparse form (no zero coefficients, monomials ordered).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Polynomial {
    terms: BTreeMap<Monomial, BigRational>,
}

impl Polynomial {
    fn zero() -> Self {
        Polynomial {
            terms: BTreeMap::new(),
        }
    }

    fn constant(c: BigRational) -> Self {
        let mut terms = BTreeMap::new();
        if !c.is_zero() {
            terms.insert(Monomial::new(), c);
        }
        Polynomial { terms }
    }

    fn variable(name: &str) -> Self {
        let mut monomial = Monomial::new();
        monomial.insert(name.to_string(), 1);
        let mut terms = BTreeMap::new();
        terms.insert(monomial, BigRational::one());
        Polynomial { terms }
    }

    fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    fn add_term(&mut self, monomial: Monomial, coefficient: BigRational) {
        let entry = self
            .terms
            .entry(monomial.clone())
            .or_insert_with(BigRational::zero);
        *entry += coefficient;
        if entry.is_zero() {
            self.terms.remove(&monomial);
        }
    }

    fn add(&self, other: &Polynomial) -> Polynomial {
        let mut result = self.clone();
        for (monomial, coefficient) in &other.terms {
            result.add_term(monomial.clone(), coefficient.clone());
        }
        result
    }

    fn neg(&self) -> Polynomial {
        Polynomial {
            terms: self
                .terms
                .iter()
                .map(|(m, c)| (m.clone(), -c.clone()))
                .collect(),
        }
    }

    fn mul(&self, other: &Polynomial) -> Polynomial {
        let mut result = Polynomial::zero();
        for (ma, ca) in &self.terms {
            for (mb, cb) in &other.terms {
                let mut monomial = ma.clone();
                for (variable, power) in mb {
                    *monomial.entry(variable.clone()).or_insert(0) += power;
                }
                result.add_term(monomial, ca * cb);
            }
        }
        result
    }

    /// Coefficient of the largest monomial in term order.
    fn leading_coefficient(&self) -> BigRational {
        self.terms
            .iter()
            .next_back()
            .map(|(_, c)| c.clone())
            .unwrap_or_else(BigRational::zero)
    }

    fn scale(&self, factor: &BigRational) -> Polynomial {
        Polynomial {
            terms: self
                .terms
                .iter()
                .map(|(m, c)| (m.clone(), c * factor))
                .collect(),
        }
    }
}

/// A quotient of two polynomials.
///
/// Kept normalized so that structural equality is meaningful: a zero
/// numerator forces the denominator to one, and the denominator's leading
/// coefficient is positive. Common polynomial factors are not cancelled, so
/// functions that are equal as functions may still compare unequal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RationalFunction {
    numerator: Polynomial,
    denominator: Polynomial,
}

impl RationalFunction {
    fn normalized(numerator: Polynomial, denominator: Polynomial) -> Result<Self, DdError> {
        if denominator.is_zero() {
            return Err(DdError::Arithmetic(
                "rational function with zero denominator".to_string(),
            ));
        }
        if numerator.is_zero() {
            return Ok(RationalFunction {
                numerator: Polynomial::zero(),
                denominator: Polynomial::constant(BigRational::one()),
            });
        }
        let leading = denominator.leading_coefficient();
        if leading.is_negative() {
            let minus_one = Polynomial::constant(-BigRational::one());
            return Ok(RationalFunction {
                numerator: numerator.mul(&minus_one),
                denominator: denominator.mul(&minus_one),
            });
        }
        Ok(RationalFunction {
            numerator,
            denominator,
        })
    }

    /// The constant function with the given value.
    pub fn constant(value: BigRational) -> Self {
        RationalFunction {
            numerator: Polynomial::constant(value),
            denominator: Polynomial::constant(BigRational::one()),
        }
    }

    /// The function consisting of a single parameter.
    pub fn parameter(name: &str) -> Self {
        RationalFunction {
            numerator: Polynomial::variable(name),
            denominator: Polynomial::constant(BigRational::one()),
        }
    }

    /// Whether this is the zero function.
    pub fn is_zero(&self) -> bool {
        self.numerator.is_zero()
    }

    fn add(&self, other: &RationalFunction) -> Result<RationalFunction, DdError> {
        let numerator = self
            .numerator
            .mul(&other.denominator)
            .add(&other.numerator.mul(&self.denominator));
        RationalFunction::normalized(numerator, self.denominator.mul(&other.denominator))
    }

    fn sub(&self, other: &RationalFunction) -> Result<RationalFunction, DdError> {
        let numerator = self
            .numerator
            .mul(&other.denominator)
            .add(&other.numerator.neg().mul(&self.denominator));
        RationalFunction::normalized(numerator, self.denominator.mul(&other.denominator))
    }

    fn mul(&self, other: &RationalFunction) -> Result<RationalFunction, DdError> {
        RationalFunction::normalized(
            self.numerator.mul(&other.numerator),
            self.denominator.mul(&other.denominator),
        )
    }

    fn div(&self, other: &RationalFunction) -> Result<RationalFunction, DdError> {
        if other.is_zero() {
            return Err(DdError::Arithmetic(
                "division by the zero function".to_string(),
            ));
        }
        RationalFunction::normalized(
            self.numerator.mul(&other.denominator),
            self.denominator.mul(&other.numerator),
        )
    }
}

/// One terminal constant.
#[derive(Debug, Clone)]
pub enum Value {
    /// A truth value.
    Bool(bool),
    /// A signed 64-bit integer.
    Int(i64),
    /// An IEEE 754 double.
    Double(f64),
    /// An arbitrary-precision rational.
    Rational(BigRational),
    /// A closed interval of doubles.
    Interval(Interval),
    /// A rational function over named parameters.
    Function(RationalFunction),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Rational(a), Value::Rational(b)) => a == b,
            (Value::Interval(a), Value::Interval(b)) => {
                a.lower.to_bits() == b.lower.to_bits() && a.upper.to_bits() == b.upper.to_bits()
            }
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Double(d) => d.to_bits().hash(state),
            Value::Rational(r) => r.hash(state),
            Value::Interval(i) => {
                i.lower.to_bits().hash(state);
                i.upper.to_bits().hash(state);
            }
            Value::Function(f) => f.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Rational(r) => write!(f, "{r}"),
            Value::Interval(i) => write!(f, "{i}"),
            Value::Function(function) => write!(f, "{function:?}"),
        }
    }
}

fn domain_mismatch(op: &'static str, lhs: &Value, rhs: &Value) -> DdError {
    DdError::DomainMismatch {
        op,
        lhs: lhs.kind(),
        rhs: rhs.kind(),
    }
}

fn finite(op: &'static str, result: f64) -> Result<f64, DdError> {
    if result.is_nan() {
        Err(DdError::Arithmetic(format!("`{op}` produced NaN")))
    } else {
        Ok(result)
    }
}

impl Value {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Boolean,
            Value::Int(_) => ValueKind::Integer,
            Value::Double(_) => ValueKind::Double,
            Value::Rational(_) => ValueKind::Rational,
            Value::Interval(_) => ValueKind::Interval,
            Value::Function(_) => ValueKind::Function,
        }
    }

    /// The additive identity of `kind`.
    pub fn zero_of(kind: ValueKind) -> Value {
        match kind {
            ValueKind::Boolean => Value::Bool(false),
            ValueKind::Integer => Value::Int(0),
            ValueKind::Double => Value::Double(0.0),
            ValueKind::Rational => Value::Rational(BigRational::zero()),
            ValueKind::Interval => Value::Interval(Interval::point(0.0)),
            ValueKind::Function => Value::Function(RationalFunction::constant(BigRational::zero())),
        }
    }

    /// The multiplicative identity of `kind`.
    pub fn one_of(kind: ValueKind) -> Value {
        match kind {
            ValueKind::Boolean => Value::Bool(true),
            ValueKind::Integer => Value::Int(1),
            ValueKind::Double => Value::Double(1.0),
            ValueKind::Rational => Value::Rational(BigRational::one()),
            ValueKind::Interval => Value::Interval(Interval::point(1.0)),
            ValueKind::Function => Value::Function(RationalFunction::constant(BigRational::one())),
        }
    }

    /// Whether this value is the zero of its kind. `-0.0` counts as zero.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Bool(b) => !b,
            Value::Int(i) => *i == 0,
            Value::Double(d) => *d == 0.0,
            Value::Rational(r) => r.is_zero(),
            Value::Interval(i) => i.lower == 0.0 && i.upper == 0.0,
            Value::Function(f) => f.is_zero(),
        }
    }

    /// A double approximation, for kinds that admit one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            Value::Rational(r) => r.to_f64(),
            Value::Interval(_) | Value::Function(_) => None,
        }
    }

    /// Numeric comparison. Only totally ordered kinds compare; NaN operands
    /// are an arithmetic failure rather than an unordered result.
    pub fn compare(&self, other: &Value, op: &'static str) -> Result<Ordering, DdError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b).ok_or_else(|| {
                DdError::Arithmetic(format!("`{op}` compared a NaN operand"))
            }),
            (Value::Rational(a), Value::Rational(b)) => Ok(a.cmp(b)),
            _ => Err(domain_mismatch(op, self, other)),
        }
    }

    /// Pointwise addition.
    pub fn add(&self, other: &Value) -> Result<Value, DdError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(*b)
                .map(Value::Int)
                .ok_or_else(|| DdError::Arithmetic("integer addition overflowed".to_string())),
            (Value::Double(a), Value::Double(b)) => Ok(Value::Double(finite("+", a + b)?)),
            (Value::Rational(a), Value::Rational(b)) => Ok(Value::Rational(a + b)),
            (Value::Interval(a), Value::Interval(b)) => Ok(Value::Interval(Interval::new(
                finite("+", a.lower + b.lower)?,
                finite("+", a.upper + b.upper)?,
            ))),
            (Value::Function(a), Value::Function(b)) => Ok(Value::Function(a.add(b)?)),
            _ => Err(domain_mismatch("+", self, other)),
        }
    }

    /// Pointwise subtraction.
    pub fn sub(&self, other: &Value) -> Result<Value, DdError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_sub(*b)
                .map(Value::Int)
                .ok_or_else(|| DdError::Arithmetic("integer subtraction overflowed".to_string())),
            (Value::Double(a), Value::Double(b)) => Ok(Value::Double(finite("-", a - b)?)),
            (Value::Rational(a), Value::Rational(b)) => Ok(Value::Rational(a - b)),
            (Value::Interval(a), Value::Interval(b)) => Ok(Value::Interval(Interval::new(
                finite("-", a.lower - b.upper)?,
                finite("-", a.upper - b.lower)?,
            ))),
            (Value::Function(a), Value::Function(b)) => Ok(Value::Function(a.sub(b)?)),
            _ => Err(domain_mismatch("-", self, other)),
        }
    }

    /// Pointwise multiplication.
    pub fn mul(&self, other: &Value) -> Result<Value, DdError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_mul(*b)
                .map(Value::Int)
                .ok_or_else(|| DdError::Arithmetic("integer multiplication overflowed".to_string())),
            (Value::Double(a), Value::Double(b)) => Ok(Value::Double(finite("*", a * b)?)),
            (Value::Rational(a), Value::Rational(b)) => Ok(Value::Rational(a * b)),
            (Value::Interval(a), Value::Interval(b)) => {
                let products = [
                    a.lower * b.lower,
                    a.lower * b.upper,
                    a.upper * b.lower,
                    a.upper * b.upper,
                ];
                let mut lower = products[0];
                let mut upper = products[0];
                for p in &products[1..] {
                    lower = lower.min(*p);
                    upper = upper.max(*p);
                }
                Ok(Value::Interval(Interval::new(
                    finite("*", lower)?,
                    finite("*", upper)?,
                )))
            }
            (Value::Function(a), Value::Function(b)) => Ok(Value::Function(a.mul(b)?)),
            _ => Err(domain_mismatch("*", self, other)),
        }
    }

    /// Pointwise division. Dividing by an exact zero is an arithmetic
    /// failure; intervals additionally fail when the divisor straddles zero.
    pub fn div(&self, other: &Value) -> Result<Value, DdError> {
        if other.is_zero() {
            return Err(DdError::Arithmetic("division by zero".to_string()));
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => match a.checked_rem(*b) {
                Some(0) => a
                    .checked_div(*b)
                    .map(Value::Int)
                    .ok_or_else(|| {
                        DdError::Arithmetic("integer division overflowed".to_string())
                    }),
                Some(_) => Err(DdError::Arithmetic(format!(
                    "integer division {a} / {b} is not exact"
                ))),
                None => Err(DdError::Arithmetic(
                    "integer division overflowed".to_string(),
                )),
            },
            (Value::Double(a), Value::Double(b)) => Ok(Value::Double(finite("/", a / b)?)),
            (Value::Rational(a), Value::Rational(b)) => Ok(Value::Rational(a / b)),
            (Value::Interval(a), Value::Interval(b)) => {
                if b.contains_zero() {
                    return Err(DdError::Arithmetic(
                        "division by an interval containing zero".to_string(),
                    ));
                }
                let reciprocal = Value::Interval(Interval::new(1.0 / b.upper, 1.0 / b.lower));
                Value::Interval(*a).mul(&reciprocal)
            }
            (Value::Function(a), Value::Function(b)) => Ok(Value::Function(a.div(b)?)),
            _ => Err(domain_mismatch("/", self, other)),
        }
    }

    /// Pointwise minimum.
    pub fn minimum(&self, other: &Value) -> Result<Value, DdError> {
        match (self, other) {
            (Value::Interval(a), Value::Interval(b)) => Ok(Value::Interval(Interval::new(
                a.lower.min(b.lower),
                a.upper.min(b.upper),
            ))),
            _ => match self.compare(other, "min")? {
                Ordering::Greater => Ok(other.clone()),
                _ => Ok(self.clone()),
            },
        }
    }

    /// Pointwise maximum.
    pub fn maximum(&self, other: &Value) -> Result<Value, DdError> {
        match (self, other) {
            (Value::Interval(a), Value::Interval(b)) => Ok(Value::Interval(Interval::new(
                a.lower.max(b.lower),
                a.upper.max(b.upper),
            ))),
            _ => match self.compare(other, "max")? {
                Ordering::Less => Ok(other.clone()),
                _ => Ok(self.clone()),
            },
        }
    }

    /// Pointwise equality test, yielding a Boolean.
    pub fn equals(&self, other: &Value) -> Result<Value, DdError> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a == b)),
            (Value::Double(a), Value::Double(b)) => match a.partial_cmp(b) {
                Some(ordering) => Ok(Value::Bool(ordering == Ordering::Equal)),
                None => Err(DdError::Arithmetic("`=` compared a NaN operand".to_string())),
            },
            (Value::Int(_), Value::Int(_)) | (Value::Rational(_), Value::Rational(_)) => {
                Ok(Value::Bool(self.compare(other, "=")? == Ordering::Equal))
            }
            (Value::Interval(a), Value::Interval(b)) => {
                Ok(Value::Bool(a.lower == b.lower && a.upper == b.upper))
            }
            (Value::Function(a), Value::Function(b)) => Ok(Value::Bool(a == b)),
            _ => Err(domain_mismatch("=", self, other)),
        }
    }

    /// Pointwise strict order test, yielding a Boolean.
    pub fn less(&self, other: &Value) -> Result<Value, DdError> {
        Ok(Value::Bool(self.compare(other, "<")? == Ordering::Less))
    }

    /// Pointwise non-strict order test, yielding a Boolean.
    pub fn less_or_equal(&self, other: &Value) -> Result<Value, DdError> {
        Ok(Value::Bool(self.compare(other, "<=")? != Ordering::Greater))
    }

    /// Pointwise exponentiation. Integer exponents must be non-negative.
    pub fn pow(&self, other: &Value) -> Result<Value, DdError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                let exponent = u32::try_from(*b).map_err(|_| {
                    DdError::Arithmetic(format!("integer exponent {b} out of range"))
                })?;
                a.checked_pow(exponent)
                    .map(Value::Int)
                    .ok_or_else(|| DdError::Arithmetic("integer power overflowed".to_string()))
            }
            (Value::Double(a), Value::Double(b)) => Ok(Value::Double(finite("pow", a.powf(*b))?)),
            (Value::Double(a), Value::Int(b)) => {
                let exponent = i32::try_from(*b).map_err(|_| {
                    DdError::Arithmetic(format!("integer exponent {b} out of range"))
                })?;
                Ok(Value::Double(finite("pow", a.powi(exponent))?))
            }
            (Value::Rational(a), Value::Int(b)) => {
                let exponent = i32::try_from(*b).map_err(|_| {
                    DdError::Arithmetic(format!("integer exponent {b} out of range"))
                })?;
                if exponent < 0 && a.is_zero() {
                    return Err(DdError::Arithmetic("zero to a negative power".to_string()));
                }
                Ok(Value::Rational(a.pow(exponent)))
            }
            _ => Err(domain_mismatch("pow", self, other)),
        }
    }

    /// Pointwise remainder.
    pub fn modulo(&self, other: &Value) -> Result<Value, DdError> {
        if other.is_zero() {
            return Err(DdError::Arithmetic("modulo by zero".to_string()));
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.rem_euclid(*b))),
            (Value::Double(a), Value::Double(b)) => Ok(Value::Double(finite("mod", a % b)?)),
            _ => Err(domain_mismatch("mod", self, other)),
        }
    }

    /// Pointwise logarithm of `self` in the base given by `other`.
    pub fn logarithm(&self, other: &Value) -> Result<Value, DdError> {
        let value = match (self, other) {
            (Value::Double(a), Value::Double(b)) => (*a, *b),
            (Value::Int(a), Value::Int(b)) => (*a as f64, *b as f64),
            _ => return Err(domain_mismatch("log", self, other)),
        };
        let (x, base) = value;
        if x <= 0.0 || base <= 0.0 || base == 1.0 {
            return Err(DdError::Arithmetic(format!(
                "logarithm of {x} in base {base} is undefined"
            )));
        }
        Ok(Value::Double(finite("log", x.log(base))?))
    }

    /// Pointwise floor. Integers are unchanged.
    pub fn floor(&self) -> Result<Value, DdError> {
        match self {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Double(d) => Ok(Value::Double(d.floor())),
            Value::Rational(r) => Ok(Value::Rational(r.floor())),
            Value::Interval(i) => Ok(Value::Interval(Interval::new(
                i.lower.floor(),
                i.upper.floor(),
            ))),
            _ => Err(domain_mismatch("floor", self, self)),
        }
    }

    /// Pointwise ceiling. Integers are unchanged.
    pub fn ceil(&self) -> Result<Value, DdError> {
        match self {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Double(d) => Ok(Value::Double(d.ceil())),
            Value::Rational(r) => Ok(Value::Rational(r.ceil())),
            Value::Interval(i) => Ok(Value::Interval(Interval::new(
                i.lower.ceil(),
                i.upper.ceil(),
            ))),
            _ => Err(domain_mismatch("ceil", self, self)),
        }
    }

    /// Zero becomes the one of the kind, everything else becomes zero.
    pub fn complement(&self) -> Value {
        if self.is_zero() {
            Value::one_of(self.kind())
        } else {
            Value::zero_of(self.kind())
        }
    }

    /// Convenience constructor for rationals from a fraction of integers.
    pub fn rational(numerator: i64, denominator: i64) -> Value {
        Value::Rational(BigRational::new(
            BigInt::from(numerator),
            BigInt::from(denominator),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_equality_is_bitwise() {
        assert_ne!(Value::Double(0.0), Value::Double(-0.0));
        assert_eq!(Value::Double(0.5), Value::Double(0.5));
        assert_ne!(Value::Double(1.0), Value::Int(1));
    }

    #[test]
    fn test_arithmetic_equality_is_numeric() {
        let eq = Value::Double(0.0).equals(&Value::Double(-0.0)).unwrap();
        assert_eq!(eq, Value::Bool(true));
    }

    #[test]
    fn test_kind_mismatch_is_reported() {
        let err = Value::Int(1).add(&Value::Double(1.0)).unwrap_err();
        assert_eq!(
            err,
            DdError::DomainMismatch {
                op: "+",
                lhs: ValueKind::Integer,
                rhs: ValueKind::Double,
            }
        );
    }

    #[test]
    fn test_double_arithmetic() {
        assert_eq!(
            Value::Double(0.25).add(&Value::Double(0.5)).unwrap(),
            Value::Double(0.75)
        );
        assert_eq!(
            Value::Double(1.0).div(&Value::Double(4.0)).unwrap(),
            Value::Double(0.25)
        );
        assert!(Value::Double(1.0).div(&Value::Double(0.0)).is_err());
        assert!(Value::Double(f64::INFINITY)
            .sub(&Value::Double(f64::INFINITY))
            .is_err());
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(Value::Int(7).modulo(&Value::Int(3)).unwrap(), Value::Int(1));
        assert_eq!(Value::Int(-7).modulo(&Value::Int(3)).unwrap(), Value::Int(2));
        assert_eq!(Value::Int(6).div(&Value::Int(3)).unwrap(), Value::Int(2));
        assert!(Value::Int(7).div(&Value::Int(3)).is_err());
        assert!(Value::Int(i64::MAX).add(&Value::Int(1)).is_err());
        assert_eq!(Value::Int(2).pow(&Value::Int(10)).unwrap(), Value::Int(1024));
    }

    #[test]
    fn test_integer_division_overflow() {
        // i64::MIN / -1 has no representable quotient
        let err = Value::Int(i64::MIN).div(&Value::Int(-1)).unwrap_err();
        assert_eq!(
            err,
            DdError::Arithmetic("integer division overflowed".to_string())
        );
        assert_eq!(
            Value::Int(i64::MIN).div(&Value::Int(1)).unwrap(),
            Value::Int(i64::MIN)
        );
    }

    #[test]
    fn test_rational_arithmetic() {
        let third = Value::rational(1, 3);
        let sum = third.add(&third).unwrap().add(&third).unwrap();
        assert_eq!(sum, Value::rational(1, 1));
        assert_eq!(
            Value::rational(1, 2).less(&Value::rational(2, 3)).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_interval_arithmetic() {
        let a = Value::Interval(Interval::new(1.0, 2.0));
        let b = Value::Interval(Interval::new(-1.0, 3.0));
        match a.add(&b).unwrap() {
            Value::Interval(i) => {
                assert_eq!(i.lower, 0.0);
                assert_eq!(i.upper, 5.0);
            }
            other => panic!("expected an interval, got {other}"),
        }
        match a.mul(&b).unwrap() {
            Value::Interval(i) => {
                assert_eq!(i.lower, -2.0);
                assert_eq!(i.upper, 6.0);
            }
            other => panic!("expected an interval, got {other}"),
        }
        assert!(a.div(&b).is_err());
    }

    #[test]
    fn test_rational_functions() {
        let p = Value::Function(RationalFunction::parameter("p"));
        let one = Value::one_of(ValueKind::Function);
        // p + (1 - p) normalizes to the constant one
        let sum = p.add(&one.sub(&p).unwrap()).unwrap();
        assert_eq!(sum, one);
        assert!(!sum.is_zero());
        assert_eq!(p.sub(&p).unwrap(), Value::zero_of(ValueKind::Function));
    }

    #[test]
    fn test_complement_and_rounding() {
        assert_eq!(Value::Double(0.0).complement(), Value::Double(1.0));
        assert_eq!(Value::Double(0.3).complement(), Value::Double(0.0));
        assert_eq!(Value::Bool(false).complement(), Value::Bool(true));
        assert_eq!(Value::Double(1.7).floor().unwrap(), Value::Double(1.0));
        assert_eq!(Value::Double(1.2).ceil().unwrap(), Value::Double(2.0));
        assert_eq!(
            Value::rational(7, 2).floor().unwrap(),
            Value::rational(3, 1)
        );
    }

    #[test]
    fn test_logarithm() {
        assert_eq!(
            Value::Double(8.0).logarithm(&Value::Double(2.0)).unwrap(),
            Value::Double(3.0)
        );
        assert!(Value::Double(-1.0).logarithm(&Value::Double(2.0)).is_err());
        assert!(Value::Double(8.0).logarithm(&Value::Double(1.0)).is_err());
    }
}
