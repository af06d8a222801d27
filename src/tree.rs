//! Tree queries and persistent rewrites
//!
//! Every rewrite returns a new tree; nodes that are not touched keep their
//! ids, so identity-based lookups stay valid across rewrites.

use crate::error::InvariantViolation;
use crate::statement::{Node, Statement, StatementId};
use std::collections::HashSet;

impl Statement {
    /// Number of statements in this subtree, the node itself included.
    pub fn count_statements(&self) -> usize {
        1 + self
            .body()
            .map(|body| body.iter().map(Statement::count_statements).sum())
            .unwrap_or(0)
    }

    /// Number of blocks in this subtree, the node itself included.
    pub fn count_blocks(&self) -> usize {
        match self.body() {
            Some(body) => 1 + body.iter().map(Statement::count_blocks).sum::<usize>(),
            None => 0,
        }
    }

    /// Nesting depth; a leaf or an empty block has depth 1.
    pub fn depth(&self) -> usize {
        1 + self
            .body()
            .and_then(|body| body.iter().map(Statement::depth).max())
            .unwrap_or(0)
    }

    /// Number of distinct places a statement can be inserted in this subtree:
    /// `len + 1` slots in the block itself plus the slots of every nested block.
    pub fn insertion_points(&self) -> usize {
        match self.body() {
            Some(body) => {
                body.len() + 1 + body.iter().map(Statement::insertion_points).sum::<usize>()
            }
            None => 0,
        }
    }

    /// Pre-order traversal, the node itself first.
    pub fn for_each<'a, F: FnMut(&'a Statement)>(&'a self, f: &mut F) {
        f(self);
        if let Some(body) = self.body() {
            for statement in body {
                statement.for_each(f);
            }
        }
    }

    pub fn any(&self, predicate: impl Fn(&Statement) -> bool) -> bool {
        self.find(predicate).is_some()
    }

    /// First node in pre-order matching `predicate`.
    pub fn find(&self, predicate: impl Fn(&Statement) -> bool) -> Option<&Statement> {
        fn go<'a>(s: &'a Statement, p: &dyn Fn(&Statement) -> bool) -> Option<&'a Statement> {
            if p(s) {
                return Some(s);
            }
            s.body()?.iter().find_map(|child| go(child, p))
        }
        go(self, &predicate)
    }

    pub fn find_by_id(&self, id: StatementId) -> Option<&Statement> {
        self.find(|s| s.id == id)
    }

    pub fn contains(&self, id: StatementId) -> bool {
        self.find_by_id(id).is_some()
    }

    pub fn filter(&self, predicate: impl Fn(&Statement) -> bool) -> Vec<&Statement> {
        let mut found = Vec::new();
        self.for_each(&mut |s| {
            if predicate(s) {
                found.push(s);
            }
        });
        found
    }

    /// Ids of every block below this node, in pre-order.
    pub fn nested_block_ids(&self) -> Vec<StatementId> {
        self.filter(|s| s.is_block())
            .into_iter()
            .map(|s| s.id)
            .filter(|id| *id != self.id)
            .collect()
    }

    /// Ids of every leaf below this node, in pre-order.
    pub fn leaf_ids(&self) -> Vec<StatementId> {
        self.filter(|s| !s.is_block()).into_iter().map(|s| s.id).collect()
    }

    /// Apply `f` to every descendant. `None` drops the node; a returned block
    /// has `f` applied to its own children in turn.
    pub fn map_not_null<F>(&self, f: &mut F) -> Statement
    where
        F: FnMut(&Statement) -> Option<Statement>,
    {
        let Some(body) = self.body() else {
            return self.clone();
        };
        let mut statements = Vec::with_capacity(body.len());
        for child in body {
            if let Some(mapped) = f(child) {
                if mapped.is_block() {
                    statements.push(mapped.map_not_null(f));
                } else {
                    statements.push(mapped);
                }
            }
        }
        self.with_body(statements)
    }

    /// Replace the descendant `id` by `replacement` (spliced in place).
    pub fn splice(&self, id: StatementId, replacement: Vec<Statement>) -> Statement {
        let Some(body) = self.body() else {
            return self.clone();
        };
        let mut statements = Vec::with_capacity(body.len() + replacement.len());
        let mut replacement = Some(replacement);
        for child in body {
            if child.id == id {
                if let Some(r) = replacement.take() {
                    statements.extend(r);
                }
            } else if child.is_block() {
                statements.push(child.splice(id, replacement.clone().unwrap_or_default()));
            } else {
                statements.push(child.clone());
            }
        }
        self.with_body(statements)
    }

    pub fn remove(&self, id: StatementId) -> Statement {
        self.splice(id, Vec::new())
    }

    /// Replace block `id` by its own children.
    pub fn inline(&self, id: StatementId) -> Statement {
        match self.find_by_id(id).and_then(|s| s.body()) {
            Some(body) => self.splice(id, body.to_vec()),
            None => self.clone(),
        }
    }

    /// Drop every usage of the handle bound by `declaration`. Awaited prints
    /// survive as plain prints of the same text.
    pub fn remove_usages(&self, declaration: &Statement) -> Statement {
        let Some(var) = declaration.declared_var() else {
            return self.clone();
        };
        self.map_not_null(&mut |s| match &s.node {
            Node::PrintAwait { var: v, text } if v == var => Some(Statement {
                id: s.id,
                node: Node::Print { text: text.clone() },
            }),
            _ if s.used_var() == Some(var) => None,
            _ => Some(s.clone()),
        })
    }

    /// Remove the handle `var` entirely: usages and bare declarations go,
    /// a launched job keeps running as a plain launch.
    pub fn without_handle(&self, var: &str) -> Statement {
        self.map_not_null(&mut |s| match &s.node {
            Node::LaunchJob { var: v, body } if v == var => Some(Statement::launch(body.clone())),
            _ if s.declared_var() == Some(var) || s.used_var() == Some(var) => None,
            _ => Some(s.clone()),
        })
    }

    /// Prepend `statement` to this block.
    pub fn insert_first(&self, statement: Statement) -> Statement {
        let mut statements = vec![statement];
        statements.extend(self.body().unwrap_or(&[]).iter().cloned());
        self.with_body(statements)
    }

    /// Insert at insertion point `point` (see [`Statement::insertion_points`]).
    /// Points past the end append to this block.
    pub fn insert_at_point(&self, point: usize, statement: Statement) -> Statement {
        let mut pending = Some(statement);
        let tree = self.insert_into(point, &mut pending);
        match pending {
            Some(statement) => {
                let mut statements = tree.body().unwrap_or(&[]).to_vec();
                statements.push(statement);
                tree.with_body(statements)
            }
            None => tree,
        }
    }

    fn insert_into(&self, point: usize, pending: &mut Option<Statement>) -> Statement {
        let Some(body) = self.body() else {
            return self.clone();
        };
        if point <= body.len() {
            let mut statements = body.to_vec();
            if let Some(statement) = pending.take() {
                statements.insert(point, statement);
            }
            return self.with_body(statements);
        }
        let mut left = point - body.len() - 1;
        let mut statements = Vec::with_capacity(body.len());
        for child in body {
            if pending.is_none() || !child.is_block() {
                statements.push(child.clone());
                continue;
            }
            let points = child.insertion_points();
            if left < points {
                statements.push(child.insert_into(left, pending));
            } else {
                left -= points;
                statements.push(child.clone());
            }
        }
        self.with_body(statements)
    }

    /// Insert `statement` somewhere strictly after the descendant `after`:
    /// among its later siblings or inside them. `pick(n)` chooses one of `n`
    /// candidate points.
    pub fn insert_after<P>(&self, after: StatementId, statement: Statement, pick: &mut P) -> Statement
    where
        P: FnMut(usize) -> usize,
    {
        let mut pending = Some(statement);
        self.insert_after_into(after, &mut pending, pick)
    }

    fn insert_after_into<P>(
        &self,
        after: StatementId,
        pending: &mut Option<Statement>,
        pick: &mut P,
    ) -> Statement
    where
        P: FnMut(usize) -> usize,
    {
        let Some(body) = self.body() else {
            return self.clone();
        };
        if let Some(position) = body.iter().position(|s| s.id == after) {
            let Some(statement) = pending.take() else {
                return self.clone();
            };
            let rest = Statement::coroutine_scope(body[position + 1..].to_vec());
            let points = rest.insertion_points();
            let chosen = if points <= 1 { 0 } else { pick(points) };
            let rest = rest.insert_at_point(chosen, statement);
            let mut statements = body[..=position].to_vec();
            statements.extend(rest.body().unwrap_or(&[]).iter().cloned());
            return self.with_body(statements);
        }
        let mut statements = Vec::with_capacity(body.len());
        for child in body {
            if pending.is_some() && child.is_block() {
                statements.push(child.insert_after_into(after, pending, pick));
            } else {
                statements.push(child.clone());
            }
        }
        self.with_body(statements)
    }
}

/// Check the structural invariants of a program tree.
pub fn validate(root: &Statement) -> Result<(), InvariantViolation> {
    if !matches!(root.node, Node::CoroutineScope { .. }) {
        return Err(InvariantViolation::RootNotScope { found: root.label() });
    }

    let mut ids = HashSet::new();
    let mut duplicate = None;
    let mut declared = HashSet::new();
    let mut redeclared = None;
    root.for_each(&mut |s| {
        if !ids.insert(s.id) && duplicate.is_none() {
            duplicate = Some(s.id);
        }
        if let Some(var) = s.declared_var() {
            if !declared.insert(var) && redeclared.is_none() {
                redeclared = Some(var.to_string());
            }
        }
    });
    if let Some(id) = duplicate {
        return Err(InvariantViolation::DuplicateId(id));
    }
    if let Some(var) = redeclared {
        return Err(InvariantViolation::DuplicateDeclaration { var });
    }

    let mut visible = Vec::new();
    check_visibility(root.body().unwrap_or(&[]), &mut visible)
}

fn check_visibility<'a>(
    statements: &'a [Statement],
    visible: &mut Vec<&'a str>,
) -> Result<(), InvariantViolation> {
    let scope_start = visible.len();
    for statement in statements {
        if let Some(var) = statement.used_var() {
            if !visible.contains(&var) {
                return Err(InvariantViolation::DanglingUsage {
                    var: var.to_string(),
                });
            }
        }
        if let Some(body) = statement.body() {
            check_visibility(body, visible)?;
        }
        if let Some(var) = statement.declared_var() {
            visible.push(var);
        }
    }
    visible.truncate(scope_start);
    Ok(())
}
