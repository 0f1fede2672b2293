//! Boolean expressions over named input bits.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// A Boolean expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    Variable(String),
    Constant(bool),
    Not(Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Xor(Box<Expression>, Box<Expression>),
}

impl Expression {
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    pub fn and(a: Expression, b: Expression) -> Self {
        Self::And(Box::new(a), Box::new(b))
    }

    pub fn or(a: Expression, b: Expression) -> Self {
        Self::Or(Box::new(a), Box::new(b))
    }

    pub fn xor(a: Expression, b: Expression) -> Self {
        Self::Xor(Box::new(a), Box::new(b))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(a: Expression) -> Self {
        Self::Not(Box::new(a))
    }

    /// Evaluate under an assignment. `None` when a variable is unassigned.
    pub fn evaluate(&self, vars: &HashMap<String, bool>) -> Option<bool> {
        Some(match self {
            Self::Variable(name) => *vars.get(name)?,
            Self::Constant(b) => *b,
            Self::Not(a) => !a.evaluate(vars)?,
            Self::And(a, b) => a.evaluate(vars)? & b.evaluate(vars)?,
            Self::Or(a, b) => a.evaluate(vars)? | b.evaluate(vars)?,
            Self::Xor(a, b) => a.evaluate(vars)? ^ b.evaluate(vars)?,
        })
    }

    /// Names of the variables used, sorted.
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Variable(name) => {
                out.insert(name.as_str());
            }
            Self::Constant(_) => {}
            Self::Not(a) => a.collect_variables(out),
            Self::And(a, b) | Self::Or(a, b) | Self::Xor(a, b) => {
                a.collect_variables(out);
                b.collect_variables(out);
            }
        }
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        match self {
            Self::Variable(_) | Self::Constant(_) => 1,
            Self::Not(a) => 1 + a.node_count(),
            Self::And(a, b) | Self::Or(a, b) | Self::Xor(a, b) => 1 + a.node_count() + b.node_count(),
        }
    }

    /// Binding strength when printed: OR < XOR < AND < NOT < atoms.
    fn precedence(&self) -> u8 {
        match self {
            Self::Or(..) => 1,
            Self::Xor(..) => 2,
            Self::And(..) => 3,
            Self::Not(_) => 4,
            Self::Variable(_) | Self::Constant(_) => 5,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, parent: u8) -> fmt::Result {
        if self.precedence() < parent {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = self.precedence();
        match self {
            Self::Variable(name) => write!(f, "{}", name),
            Self::Constant(b) => write!(f, "{}", u8::from(*b)),
            Self::Not(a) => {
                write!(f, "~")?;
                // ~~a and ~(a b) need the inner form kept apart
                a.fmt_operand(f, prec + 1)
            }
            Self::And(a, b) => {
                a.fmt_operand(f, prec)?;
                write!(f, " ")?;
                b.fmt_operand(f, prec)
            }
            Self::Xor(a, b) => {
                a.fmt_operand(f, prec)?;
                write!(f, " ^ ")?;
                b.fmt_operand(f, prec)
            }
            Self::Or(a, b) => {
                a.fmt_operand(f, prec)?;
                write!(f, " + ")?;
                b.fmt_operand(f, prec)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn var(n: &str) -> Expression {
        Expression::variable(n)
    }

    #[test]
    fn test_display_precedence() {
        let e = Expression::or(Expression::and(var("a"), var("b")), Expression::not(var("c")));
        assert_eq!(e.to_string(), "a b + ~c");

        let e = Expression::and(Expression::or(var("a"), var("b")), var("c"));
        assert_eq!(e.to_string(), "(a + b) c");

        let e = Expression::not(Expression::xor(var("a"), var("b")));
        assert_eq!(e.to_string(), "~(a ^ b)");

        let e = Expression::not(Expression::not(Expression::Constant(true)));
        assert_eq!(e.to_string(), "~(~1)");

        let e = Expression::xor(Expression::or(var("a"), var("b")), Expression::and(var("c"), var("d")));
        assert_eq!(e.to_string(), "(a + b) ^ c d");
    }

    #[test]
    fn test_evaluate() {
        let e = Expression::xor(var("a"), Expression::and(var("b"), Expression::Constant(true)));
        let vars: HashMap<String, bool> = [("a".to_string(), true), ("b".to_string(), true)].into();
        assert_eq!(e.evaluate(&vars), Some(false));
        assert_eq!(var("z").evaluate(&vars), None);
        assert_eq!(e.variables().into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(e.node_count(), 5);
    }

    fn arb_expr() -> impl Strategy<Value = Expression> {
        let leaf = prop_oneof![
            prop_oneof![Just("a"), Just("b"), Just("c")].prop_map(Expression::variable),
            any::<bool>().prop_map(Expression::Constant),
        ];
        leaf.prop_recursive(4, 32, 2, |inner| {
            prop_oneof![
                inner.clone().prop_map(Expression::not),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| Expression::and(a, b)),
                (inner.clone(), inner.clone()).prop_map(|(a, b)| Expression::or(a, b)),
                (inner.clone(), inner).prop_map(|(a, b)| Expression::xor(a, b)),
            ]
        })
    }

    proptest! {
        #[test]
        fn test_de_morgan_holds(a in arb_expr(), b in arb_expr(), va: bool, vb: bool, vc: bool) {
            let vars: HashMap<String, bool> =
                [("a".to_string(), va), ("b".to_string(), vb), ("c".to_string(), vc)].into();
            let lhs = Expression::not(Expression::and(a.clone(), b.clone()));
            let rhs = Expression::or(Expression::not(a), Expression::not(b));
            prop_assert_eq!(lhs.evaluate(&vars), rhs.evaluate(&vars));
        }
    }
}
