use crate::plan::{Constraint, GroupBy, MatchBlock, QueryPlan, Row, Step, Term};
use feinschmecker_core::{FeinschmeckerError, KnowledgeStore, Literal, NodeId, Result};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::debug;

/// Evaluates [`QueryPlan`]s against a read-only knowledge store.
pub struct PlanExecutor<'a> {
    store: &'a dyn KnowledgeStore,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(store: &'a dyn KnowledgeStore) -> Self {
        Self { store }
    }

    /// Runs the plan and returns grouped rows ordered by the plan's ordering variable.
    pub fn execute(&self, plan: &QueryPlan) -> Result<Vec<Row>> {
        let start = Instant::now();
        let rows = self.run(&plan.steps, vec![Row::new()])?;
        let matched = rows.len();
        let rows = match &plan.group {
            Some(group) => group_rows(rows, group)?,
            None => rows,
        };
        let rows = self.order(rows, &plan.order_by)?;
        debug!(
            matched,
            returned = rows.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Executed query plan"
        );
        Ok(rows)
    }

    fn run(&self, steps: &[Step], mut rows: Vec<Row>) -> Result<Vec<Row>> {
        for step in steps {
            if rows.is_empty() {
                break;
            }
            rows = self.apply(step, rows)?;
        }
        Ok(rows)
    }

    fn apply(&self, step: &Step, rows: Vec<Row>) -> Result<Vec<Row>> {
        let mut out = Vec::with_capacity(rows.len());
        match step {
            Step::Scan { var, label } => {
                let ids = self.store.nodes_with_label(*label);
                for row in rows {
                    ensure_unbound(&row, var)?;
                    for id in ids {
                        out.push(bind(&row, var, Term::Node(*id)));
                    }
                }
            }
            Step::Lookup { var, label, key } => {
                let found = self.store.lookup(*label, key).map(|n| n.id);
                for row in rows {
                    ensure_unbound(&row, var)?;
                    if let Some(id) = found {
                        out.push(bind(&row, var, Term::Node(id)));
                    }
                }
            }
            Step::Traverse { from, relation, to } => {
                for row in rows {
                    let source = node_of(&row, from)?;
                    let targets = self.store.related(source, *relation);
                    match row.get(to) {
                        Some(existing) => {
                            let existing = existing.as_node().ok_or_else(|| {
                                FeinschmeckerError::Compile(format!("'{}' is not a node", to))
                            })?;
                            if targets.contains(&existing) {
                                out.push(row);
                            }
                        }
                        None => {
                            for target in targets {
                                out.push(bind(&row, to, Term::Node(*target)));
                            }
                        }
                    }
                }
            }
            Step::Property {
                node,
                property,
                bind: var,
            } => {
                for row in rows {
                    let id = node_of(&row, node)?;
                    let Some(value) = self.store.node(id).and_then(|n| n.property(*property)) else {
                        continue;
                    };
                    match row.get(var) {
                        Some(Term::Literal(existing)) if existing == value => out.push(row),
                        Some(_) => {}
                        None => out.push(bind(&row, var, Term::Literal(value.clone()))),
                    }
                }
            }
            Step::Filter(constraint) => {
                for row in rows {
                    if satisfies(&row, constraint)? {
                        out.push(row);
                    }
                }
            }
            Step::Optional(inner) => {
                for row in rows {
                    let matched = self.run(inner, vec![row.clone()])?;
                    if matched.is_empty() {
                        out.push(row);
                    } else {
                        out.extend(matched);
                    }
                }
            }
            Step::Exists(inner) => {
                let distinct = distinct_sets(inner);
                for row in rows {
                    if self.exists(inner, row.clone(), &distinct)? {
                        out.push(row);
                    }
                }
            }
            Step::Require(inner) => {
                for row in rows {
                    let matched = self.run(inner, vec![row.clone()])?;
                    if matched.is_empty() {
                        return Err(self.missing(&row, inner));
                    }
                    out.extend(matched);
                }
            }
            Step::DistinctMatch(blocks) => {
                for row in rows {
                    let mut candidates = Vec::with_capacity(blocks.len());
                    for block in blocks {
                        let nodes = self.candidates(block, &row)?;
                        if nodes.is_empty() {
                            break;
                        }
                        candidates.push(nodes);
                    }
                    if candidates.len() == blocks.len() && has_distinct_assignment(&candidates) {
                        out.push(row);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Depth-first search for one complete match of `steps`, pruning as soon as a
    /// `Distinct` constraint is violated by the variables bound so far.
    fn exists(&self, steps: &[Step], row: Row, distinct: &[&[String]]) -> Result<bool> {
        let Some((step, rest)) = steps.split_first() else {
            return Ok(true);
        };
        for next in self.apply(step, vec![row])? {
            if !distinct.iter().all(|vars| bound_distinct(&next, vars)) {
                continue;
            }
            if self.exists(rest, next, distinct)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Distinct nodes that `block.var` can take for this row, in first-seen order.
    fn candidates(&self, block: &MatchBlock, row: &Row) -> Result<Vec<NodeId>> {
        let mut nodes = Vec::new();
        for matched in self.run(&block.steps, vec![row.clone()])? {
            let id = node_of(&matched, &block.var)?;
            if !nodes.contains(&id) {
                nodes.push(id);
            }
        }
        Ok(nodes)
    }

    fn missing(&self, row: &Row, inner: &[Step]) -> FeinschmeckerError {
        let (source, what) = match inner.first() {
            Some(Step::Property { node, property, .. }) => (node, format!("{:?}", property)),
            Some(Step::Traverse { from, relation, .. }) => (from, format!("{:?}", relation)),
            _ => return FeinschmeckerError::DataIntegrity("required pattern did not match".into()),
        };
        let key = row
            .get(source)
            .and_then(Term::as_node)
            .and_then(|id| self.store.node(id))
            .map(|n| n.key.as_str())
            .unwrap_or("?");
        FeinschmeckerError::DataIntegrity(format!("'{}' has no {}", key, what))
    }

    fn order(&self, rows: Vec<Row>, var: &str) -> Result<Vec<Row>> {
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let id = node_of(&row, var)?;
            let key = self
                .store
                .node(id)
                .map(|n| n.key.clone())
                .ok_or_else(|| FeinschmeckerError::DataIntegrity(format!("dangling node {}", id)))?;
            keyed.push((key, row));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }
}

fn distinct_sets(steps: &[Step]) -> Vec<&[String]> {
    steps
        .iter()
        .filter_map(|s| match s {
            Step::Filter(Constraint::Distinct(vars)) => Some(vars.as_slice()),
            _ => None,
        })
        .collect()
}

/// True when the already bound members of `vars` are pairwise different.
fn bound_distinct(row: &Row, vars: &[String]) -> bool {
    let bound: Vec<&Term> = vars.iter().filter_map(|v| row.get(v)).collect();
    bound
        .iter()
        .enumerate()
        .all(|(i, term)| !bound[i + 1..].contains(term))
}

/// Kuhn's augmenting-path matching: can every block get its own node?
fn has_distinct_assignment(candidates: &[Vec<NodeId>]) -> bool {
    let mut owner: HashMap<NodeId, usize> = HashMap::new();
    (0..candidates.len()).all(|block| {
        let mut visited = HashSet::new();
        augment(block, candidates, &mut owner, &mut visited)
    })
}

fn augment(
    block: usize,
    candidates: &[Vec<NodeId>],
    owner: &mut HashMap<NodeId, usize>,
    visited: &mut HashSet<NodeId>,
) -> bool {
    for node in &candidates[block] {
        if !visited.insert(*node) {
            continue;
        }
        let free = match owner.get(node).copied() {
            None => true,
            Some(other) => augment(other, candidates, owner, visited),
        };
        if free {
            owner.insert(*node, block);
            return true;
        }
    }
    false
}

fn bind(row: &Row, var: &str, term: Term) -> Row {
    let mut next = row.clone();
    next.insert(var.to_string(), term);
    next
}

fn ensure_unbound(row: &Row, var: &str) -> Result<()> {
    if row.contains_key(var) {
        return Err(FeinschmeckerError::Compile(format!(
            "variable '{}' bound twice",
            var
        )));
    }
    Ok(())
}

fn node_of(row: &Row, var: &str) -> Result<NodeId> {
    row.get(var)
        .and_then(Term::as_node)
        .ok_or_else(|| FeinschmeckerError::Compile(format!("'{}' is not bound to a node", var)))
}

fn literal_of<'r>(row: &'r Row, var: &str) -> Result<&'r Literal> {
    row.get(var)
        .and_then(Term::as_literal)
        .ok_or_else(|| FeinschmeckerError::Compile(format!("'{}' is not bound to a value", var)))
}

fn satisfies(row: &Row, constraint: &Constraint) -> Result<bool> {
    Ok(match constraint {
        Constraint::Compare { var, op, value } => op.holds(literal_of(row, var)?, value),
        Constraint::ContainsIgnoreCase { var, needle } => literal_of(row, var)?
            .as_str()
            .map(|s| s.to_lowercase().contains(needle.as_str()))
            .unwrap_or(false),
        Constraint::Distinct(vars) => {
            let mut seen = Vec::with_capacity(vars.len());
            for var in vars {
                let term = row.get(var).ok_or_else(|| {
                    FeinschmeckerError::Compile(format!("'{}' is not bound", var))
                })?;
                if seen.contains(&term) {
                    return Ok(false);
                }
                seen.push(term);
            }
            true
        }
    })
}

struct Group {
    key: Vec<Option<Term>>,
    row: Row,
    collected: Vec<Literal>,
}

/// Groups rows whose key bindings are all equal. The first node in the key buckets the
/// search so grouping stays linear in the usual one-recipe-per-bucket case.
fn group_rows(rows: Vec<Row>, group: &GroupBy) -> Result<Vec<Row>> {
    let mut groups: Vec<Group> = Vec::new();
    let mut buckets: HashMap<Option<NodeId>, Vec<usize>> = HashMap::new();

    for row in rows {
        let key: Vec<Option<Term>> = group.key.iter().map(|k| row.get(k).cloned()).collect();
        let bucket = key.iter().flatten().find_map(Term::as_node);
        let value = match row.get(&group.collect) {
            Some(Term::Literal(l)) => Some(l.clone()),
            Some(_) => {
                return Err(FeinschmeckerError::Compile(format!(
                    "'{}' cannot be aggregated",
                    group.collect
                )))
            }
            None => None,
        };

        let slots = buckets.entry(bucket).or_default();
        let index = match slots.iter().find(|i| groups[**i].key == key) {
            Some(i) => *i,
            None => {
                let mut base = Row::new();
                for (name, term) in group.key.iter().zip(&key) {
                    if let Some(term) = term {
                        base.insert(name.clone(), term.clone());
                    }
                }
                groups.push(Group {
                    key,
                    row: base,
                    collected: Vec::new(),
                });
                slots.push(groups.len() - 1);
                groups.len() - 1
            }
        };
        if let Some(value) = value {
            groups[index].collected.push(value);
        }
    }

    Ok(groups
        .into_iter()
        .map(|g| {
            let mut row = g.row;
            row.insert(group.into.clone(), Term::List(g.collected));
            row
        })
        .collect())
}
