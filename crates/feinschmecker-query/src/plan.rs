//! Typed query plans over the recipe knowledge graph.
//!
//! A plan is an ordered list of [`Step`]s evaluated left to right against a set of partial
//! variable bindings, followed by an optional grouping stage. Filter values are carried as
//! typed [`Literal`]s, never spliced into text.

use feinschmecker_core::{Literal, NodeId, NodeLabel, Property, Relation};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Value bound to a plan variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Node(NodeId),
    Literal(Literal),
    List(Vec<Literal>),
}

impl Term {
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Term::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(l) => Some(l),
            _ => None,
        }
    }
}

pub type Row = HashMap<String, Term>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    Lt,
}

impl Comparison {
    /// Evaluates `left <op> right`. Values of incompatible kinds never match.
    pub fn holds(&self, left: &Literal, right: &Literal) -> bool {
        match compare_literals(left, right) {
            Some(ord) => match self {
                Comparison::Eq => ord == Ordering::Equal,
                Comparison::Gt => ord == Ordering::Greater,
                Comparison::Lt => ord == Ordering::Less,
            },
            None => false,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Comparison::Eq => "=",
            Comparison::Gt => ">",
            Comparison::Lt => "<",
        };
        write!(f, "{}", s)
    }
}

fn compare_literals(left: &Literal, right: &Literal) -> Option<Ordering> {
    match (left, right) {
        (Literal::Bool(a), Literal::Bool(b)) => Some(a.cmp(b)),
        (Literal::Text(a), Literal::Text(b)) => Some(a.cmp(b)),
        (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Compare {
        var: String,
        op: Comparison,
        value: Literal,
    },
    /// Case-insensitive substring match on a text binding. `needle` is stored lower-cased.
    ContainsIgnoreCase { var: String, needle: String },
    /// All listed variables are bound to pairwise different terms.
    Distinct(Vec<String>),
}

impl Constraint {
    pub fn compare(var: &str, op: Comparison, value: impl Into<Literal>) -> Self {
        Constraint::Compare {
            var: var.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn contains_ignore_case(var: &str, needle: &str) -> Self {
        Constraint::ContainsIgnoreCase {
            var: var.to_string(),
            needle: needle.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Binds `var` to every node carrying `label`.
    Scan { var: String, label: NodeLabel },
    /// Binds `var` to the single node identified by `(label, key)`, if any.
    Lookup {
        var: String,
        label: NodeLabel,
        key: String,
    },
    /// Follows `relation` from the node bound to `from`, binding `to`.
    Traverse {
        from: String,
        relation: Relation,
        to: String,
    },
    /// Binds `bind` to a datatype property of `node`. Rows lacking the property are dropped.
    Property {
        node: String,
        property: Property,
        bind: String,
    },
    Filter(Constraint),
    /// Left-outer pattern: rows with no match pass through without the inner bindings.
    Optional(Vec<Step>),
    /// Existential pattern: keeps a row iff the inner steps match at least once. Inner
    /// bindings are discarded so rows never multiply.
    Exists(Vec<Step>),
    /// Mandatory pattern. Every row must match the inner steps; a row that does not is a
    /// [`DataIntegrity`](feinschmecker_core::FeinschmeckerError::DataIntegrity) error
    /// instead of being dropped.
    Require(Vec<Step>),
    /// Keeps a row iff each block can bind its `var` to a node that no other block uses.
    /// Candidates are gathered per block, then assigned by bipartite matching, so the cost
    /// grows with `blocks * candidates` rather than with their product. Inner bindings are
    /// discarded.
    DistinctMatch(Vec<MatchBlock>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchBlock {
    pub var: String,
    pub steps: Vec<Step>,
}

impl Step {
    pub fn scan(var: &str, label: NodeLabel) -> Self {
        Step::Scan {
            var: var.to_string(),
            label,
        }
    }

    pub fn lookup(var: &str, label: NodeLabel, key: &str) -> Self {
        Step::Lookup {
            var: var.to_string(),
            label,
            key: key.to_string(),
        }
    }

    pub fn traverse(from: &str, relation: Relation, to: &str) -> Self {
        Step::Traverse {
            from: from.to_string(),
            relation,
            to: to.to_string(),
        }
    }

    pub fn property(node: &str, property: Property, bind: &str) -> Self {
        Step::Property {
            node: node.to_string(),
            property,
            bind: bind.to_string(),
        }
    }

    /// Property lookup that must succeed for every row.
    pub fn required_property(node: &str, property: Property, bind: &str) -> Self {
        Step::Require(vec![Step::property(node, property, bind)])
    }
}

/// Collapses rows sharing every `key` binding into one row, gathering `collect` values into a
/// list bound to `into` in first-seen order.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy {
    pub key: Vec<String>,
    pub collect: String,
    pub into: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub steps: Vec<Step>,
    pub group: Option<GroupBy>,
    /// Node variable whose stable key orders the final rows.
    pub order_by: String,
}

impl QueryPlan {
    pub fn new(steps: Vec<Step>, group: Option<GroupBy>, order_by: &str) -> Self {
        Self {
            steps,
            group,
            order_by: order_by.to_string(),
        }
    }

    pub fn filters(&self) -> impl Iterator<Item = &Constraint> {
        self.steps.iter().filter_map(|s| match s {
            Step::Filter(c) => Some(c),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparisons_are_typed() {
        let five = Literal::Number(5.0);
        assert!(Comparison::Gt.holds(&five, &Literal::Integer(4)));
        assert!(Comparison::Lt.holds(&Literal::Integer(4), &five));
        assert!(!Comparison::Lt.holds(&five, &five));
        assert!(Comparison::Eq.holds(&Literal::Bool(true), &Literal::Bool(true)));
        assert!(!Comparison::Eq.holds(&Literal::Bool(true), &Literal::Integer(1)));
        assert!(!Comparison::Gt.holds(&Literal::from("10"), &Literal::Integer(1)));
    }

    #[test]
    fn needle_is_lowercased() {
        assert_eq!(
            Constraint::contains_ignore_case("x", "EGG"),
            Constraint::ContainsIgnoreCase {
                var: "x".into(),
                needle: "egg".into()
            }
        );
    }
}
