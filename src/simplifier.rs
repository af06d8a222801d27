//! Simplifier
//!
//! Rewrites a program until every remaining statement matters. Most passes
//! only adopt a candidate when the whole-tree evaluation is unchanged; the
//! last pass breaks infinite waits and is allowed to change the output.
//! Passes run in a fixed order and the round repeats until nothing changes.

use crate::evaluator::{evaluate, Evaluation};
use crate::statement::{Node, Statement, StatementId};
use crate::tree::validate;
use std::collections::HashSet;
use tracing::{debug, trace, warn};

/// Any print later than this counts as waiting forever.
pub const INFINITE_WAIT_THRESHOLD: u64 = 1_000_000;

type Pass = fn(&Statement) -> Statement;

const PASSES: [(&str, Pass); 4] = [
    ("redundant_blocks", purge_redundant_blocks),
    ("redundant_leaves", purge_redundant_leaves),
    ("usage_consistency", usage_consistency),
    ("infinite_waits", eliminate_infinite_waits),
];

/// Run every pass to a fixed point.
pub fn simplify(tree: &Statement) -> Statement {
    let mut current = tree.clone();
    let mut round = 0;
    loop {
        round += 1;
        let mut next = current.clone();
        for (name, pass) in PASSES {
            let rewritten = pass(&next);
            if rewritten != next {
                debug!(
                    pass = name,
                    round,
                    before = next.count_statements(),
                    after = rewritten.count_statements(),
                    "pass changed tree"
                );
                debug_assert_eq!(validate(&rewritten), Ok(()));
                next = rewritten;
            }
        }
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Whether a program waits forever or prints absurdly late.
pub fn hangs(tree: &Statement) -> bool {
    evaluate(tree).hangs(INFINITE_WAIT_THRESHOLD)
}

/// Accepts candidates whose evaluation matches the tree the pass started from.
struct Oracle {
    baseline: Evaluation,
}

impl Oracle {
    fn new(tree: &Statement) -> Self {
        Self {
            baseline: evaluate(tree),
        }
    }

    fn accepts(&self, candidate: &Statement) -> bool {
        evaluate(candidate) == self.baseline
    }
}

/// Remove each id together with the usages of whatever it declared.
fn remove_with_usages(tree: &Statement, ids: &[StatementId]) -> Statement {
    let mut out = tree.clone();
    for id in ids {
        if let Some(removed) = out.find_by_id(*id).cloned() {
            out = out.remove(*id).remove_usages(&removed);
        }
    }
    out
}

fn inline_with_usages(tree: &Statement, id: StatementId) -> Statement {
    match tree.find_by_id(id).cloned() {
        Some(block) => tree.inline(id).remove_usages(&block),
        None => tree.clone(),
    }
}

/// Inline or drop every block that does not affect the result.
pub fn purge_redundant_blocks(tree: &Statement) -> Statement {
    let oracle = Oracle::new(tree);
    let mut current = tree.clone();
    for id in tree.nested_block_ids() {
        if !current.contains(id) {
            continue;
        }
        let inlined = inline_with_usages(&current, id);
        if oracle.accepts(&inlined) {
            trace!(%id, "inlined block");
            current = inlined;
            continue;
        }
        let dropped = remove_with_usages(&current, &[id]);
        if oracle.accepts(&dropped) {
            trace!(%id, "dropped block");
            current = dropped;
        }
    }
    current
}

fn alternates(window: &[Statement]) -> bool {
    match window {
        [a, b, c, d] => {
            (a.is_print() && b.is_delay() && c.is_print() && d.is_delay())
                || (a.is_delay() && b.is_print() && c.is_delay() && d.is_print())
        }
        _ => false,
    }
}

/// Trailing pairs of `Print, Delay, Print, Delay` runs (either phase), which
/// are tried as a unit before single leaves.
fn alternating_pairs(tree: &Statement) -> Vec<[StatementId; 2]> {
    let mut pairs = Vec::new();
    tree.for_each(&mut |block| {
        if let Some(body) = block.body() {
            for window in body.windows(4) {
                if alternates(window) {
                    pairs.push([window[2].id, window[3].id]);
                }
            }
        }
    });
    pairs
}

/// Drop every leaf that does not affect the result.
pub fn purge_redundant_leaves(tree: &Statement) -> Statement {
    let oracle = Oracle::new(tree);
    let mut current = tree.clone();
    for pair in alternating_pairs(tree) {
        if !pair.iter().all(|id| current.contains(*id)) {
            continue;
        }
        let candidate = remove_with_usages(&current, &pair);
        if oracle.accepts(&candidate) {
            trace!(first = %pair[0], second = %pair[1], "dropped alternating pair");
            current = candidate;
        }
    }
    for id in tree.leaf_ids() {
        if !current.contains(id) {
            continue;
        }
        let candidate = remove_with_usages(&current, &[id]);
        if oracle.accepts(&candidate) {
            trace!(%id, "dropped leaf");
            current = candidate;
        }
    }
    current
}

/// Drop dangling usages and downgrade handles nobody uses.
pub fn usage_consistency(tree: &Statement) -> Statement {
    let mut declared = HashSet::new();
    let mut used = HashSet::new();
    tree.for_each(&mut |s| {
        if let Some(var) = s.declared_var() {
            declared.insert(var.to_string());
        }
        if let Some(var) = s.used_var() {
            used.insert(var.to_string());
        }
    });

    tree.map_not_null(&mut |s| {
        if let Some(var) = s.used_var() {
            if !declared.contains(var) {
                // An unbound await still prints its text.
                return match &s.node {
                    Node::PrintAwait { text, .. } => Some(Statement {
                        id: s.id,
                        node: Node::Print { text: text.clone() },
                    }),
                    _ => None,
                };
            }
        }
        match &s.node {
            Node::LaunchJob { var, body } | Node::Async { var, body, .. }
                if !used.contains(var) =>
            {
                Some(Statement::launch(body.clone()))
            }
            Node::Job { var } if !used.contains(var) => None,
            _ => Some(s.clone()),
        }
    })
}

/// Break infinite waits, preferring the removal of a single bare `Job`.
pub fn eliminate_infinite_waits(tree: &Statement) -> Statement {
    if !hangs(tree) {
        return tree.clone();
    }

    let jobs: Vec<String> = tree
        .filter(|s| matches!(s.node, Node::Job { .. }))
        .into_iter()
        .filter_map(|s| s.declared_var().map(str::to_string))
        .collect();

    for var in &jobs {
        let candidate = tree.without_handle(var);
        if !hangs(&candidate) {
            debug!(job = %var, "removed job to break infinite wait");
            return candidate;
        }
    }

    let mut current = tree.clone();
    for var in &jobs {
        current = current.without_handle(var);
    }

    if hangs(&current) {
        warn!(
            jobs = jobs.len(),
            statements = current.count_statements(),
            "still waiting forever without jobs, removing every join"
        );
        current = current.map_not_null(&mut |s| match s.node {
            Node::Join { .. } => None,
            _ => Some(s.clone()),
        });
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{PrintEvent, Termination};
    use crate::statement::ExceptionKind;

    fn root(body: Vec<Statement>) -> Statement {
        Statement::coroutine_scope(body)
    }

    #[test]
    fn test_drops_dead_delay_at_end() {
        let tree = root(vec![Statement::print("A"), Statement::delay(1000)]);
        let simplified = simplify(&tree);
        // The trailing delay moves the end time, so it stays.
        assert_eq!(simplified.count_statements(), 3);

        let tree = root(vec![
            Statement::delay(1000),
            Statement::print("A"),
            Statement::launch(vec![]),
        ]);
        let simplified = simplify(&tree);
        assert_eq!(evaluate(&simplified), evaluate(&tree));
        assert_eq!(simplified.count_statements(), 3);
    }

    #[test]
    fn test_inlines_redundant_scope() {
        let tree = root(vec![Statement::coroutine_scope(vec![
            Statement::delay(1000),
            Statement::print("A"),
        ])]);
        let simplified = simplify(&tree);
        let labels: Vec<_> = simplified.body().unwrap().iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["Delay", "Print"]);
        assert_eq!(evaluate(&simplified), evaluate(&tree));
    }

    #[test]
    fn test_unreached_alternating_tail_is_dropped_as_a_pair() {
        let tail_print = Statement::print("B");
        let tail_delay = Statement::delay(1000);
        let (print_id, delay_id) = (tail_print.id, tail_delay.id);
        let tree = root(vec![
            Statement::launch_job(
                "job1",
                vec![Statement::print("A"), Statement::delay(1000), tail_print, tail_delay],
            ),
            Statement::delay(500),
            Statement::cancel("job1"),
        ]);
        assert_eq!(alternating_pairs(&tree), vec![[print_id, delay_id]]);

        let purged = purge_redundant_leaves(&tree);
        assert_ne!(purged, tree);
        assert!(!purged.contains(print_id));
        assert!(!purged.contains(delay_id));
        assert!(purged.any(|s| matches!(&s.node, Node::Print { text } if text == "A")));
        assert_eq!(evaluate(&purged), evaluate(&tree));
    }

    #[test]
    fn test_block_inlining_wins_over_dropping() {
        // Dropping the launch would keep the output too; inlining is tried first.
        let dangling = Statement::cancel("job9");
        let dangling_id = dangling.id;
        let launch = Statement::launch(vec![dangling]);
        let launch_id = launch.id;
        let tree = root(vec![Statement::print("A"), launch]);

        let purged = purge_redundant_blocks(&tree);
        assert!(!purged.contains(launch_id));
        assert!(purged.contains(dangling_id));
        assert_eq!(evaluate(&purged), evaluate(&tree));

        let scope = Statement::coroutine_scope(vec![Statement::print("B")]);
        let scope_id = scope.id;
        let tree = root(vec![Statement::print("A"), scope]);
        let purged = purge_redundant_blocks(&tree);
        assert!(!purged.contains(scope_id));
        assert!(purged.any(|s| matches!(&s.node, Node::Print { text } if text == "B")));
        assert_eq!(evaluate(&purged), evaluate(&tree));
    }

    #[test]
    fn test_usage_consistency_downgrades() {
        let tree = root(vec![
            Statement::launch_job("job1", vec![Statement::print("A")]),
            Statement::async_value("value1", "B", vec![Statement::delay(1000)]),
            Statement::job("job2"),
        ]);
        let fixed = usage_consistency(&tree);
        let labels: Vec<_> = fixed.body().unwrap().iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["Launch", "Launch"]);
        assert_eq!(evaluate(&fixed), evaluate(&tree));
    }

    #[test]
    fn test_usage_consistency_keeps_dangling_await_output() {
        let tree = root(vec![Statement::print_await("value7", "Q"), Statement::join("job7")]);
        let fixed = usage_consistency(&tree);
        assert_eq!(fixed.count_statements(), 2);
        assert_eq!(evaluate(&fixed), evaluate(&tree));
    }

    #[test]
    fn test_never_completed_job_is_removed() {
        let tree = root(vec![
            Statement::job("job1"),
            Statement::print("A"),
            Statement::join("job1"),
            Statement::print("B"),
        ]);
        assert!(hangs(&tree));
        let simplified = simplify(&tree);
        assert!(!hangs(&simplified));
        assert!(!simplified.any(|s| s.declared_var() == Some("job1") || s.used_var() == Some("job1")));
        let evaluation = evaluate(&simplified);
        assert_eq!(evaluation.termination, Termination::Completed);
        // "B" was unreachable while the join hung, so it went first.
        assert_eq!(evaluation.events, vec![PrintEvent::new("A", 0)]);
    }

    #[test]
    fn test_caught_throw_is_removed() {
        let tree = root(vec![
            Statement::delay(1000),
            Statement::try_catch(
                ExceptionKind::Generic,
                vec![Statement::throw(ExceptionKind::Custom)],
            ),
            Statement::print("A"),
        ]);
        let simplified = simplify(&tree);
        // "Got exception" is an observable print, so the try/catch stays.
        assert_eq!(evaluate(&simplified), evaluate(&tree));
        assert!(simplified.any(|s| matches!(s.node, Node::TryCatch { .. })));
    }

    #[test]
    fn test_simplify_is_idempotent_on_small_tree() {
        let tree = root(vec![
            Statement::launch(vec![Statement::delay(1000), Statement::print("A")]),
            Statement::print("B"),
            Statement::launch(vec![Statement::print("C")]),
        ]);
        let once = simplify(&tree);
        let twice = simplify(&once);
        assert_eq!(once, twice);
    }
}
