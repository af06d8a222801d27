//! Generator
//!
//! Grows a program tree to an exact statement count. Every pick is budgeted
//! (`statements_needed <= left`), so the tree never overshoots the target.

use crate::error::GenerationError;
use crate::rng::DetRng;
use crate::statement::{ExceptionKind, Node, Statement};
use crate::tree::validate;
use crate::values::ValueGenerator;
use std::fmt;
use tracing::trace;

/// Generator vocabulary. Pairs such as `LaunchJoin` expand to a declaration
/// plus its usages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Delay,
    Print,
    Launch,
    AsyncAwait,
    CoroutineScope,
    LaunchJoin,
    LaunchCancel,
    ScopeLaunch,
    JobCompleteJoin,
    ThrowException,
    TryCatch,
    SupervisorScope,
}

impl StatementKind {
    pub fn is_block(self) -> bool {
        matches!(
            self,
            StatementKind::Launch
                | StatementKind::AsyncAwait
                | StatementKind::CoroutineScope
                | StatementKind::LaunchJoin
                | StatementKind::LaunchCancel
                | StatementKind::ScopeLaunch
                | StatementKind::TryCatch
                | StatementKind::SupervisorScope
        )
    }

    pub fn usage_count(self) -> usize {
        match self {
            StatementKind::AsyncAwait | StatementKind::LaunchJoin | StatementKind::LaunchCancel => {
                1
            }
            StatementKind::JobCompleteJoin => 2,
            _ => 0,
        }
    }

    pub fn has_usage(self) -> bool {
        self.usage_count() > 0
    }

    /// Statements this kind adds at minimum: itself, one body statement for
    /// blocks, and its usages.
    pub fn statements_needed(self) -> usize {
        1 + usize::from(self.is_block()) + self.usage_count()
    }
}

/// Kind profiles. Duplicates bias the uniform pick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Difficulty {
    Simple,
    WithSynchronization,
    WithExceptions,
    WithSynchronizationAndExceptions,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Simple,
        Difficulty::WithSynchronization,
        Difficulty::WithExceptions,
        Difficulty::WithSynchronizationAndExceptions,
    ];

    pub fn kinds(self) -> Vec<StatementKind> {
        use StatementKind::*;
        match self {
            Difficulty::Simple => vec![Delay, Print, Launch, AsyncAwait, AsyncAwait, AsyncAwait],
            Difficulty::WithSynchronization => vec![
                Delay,
                Print,
                LaunchJoin,
                ScopeLaunch,
                AsyncAwait,
                CoroutineScope,
                JobCompleteJoin,
            ],
            Difficulty::WithExceptions => vec![
                Delay,
                Delay,
                Print,
                Print,
                Launch,
                ScopeLaunch,
                AsyncAwait,
                AsyncAwait,
                CoroutineScope,
                ThrowException,
                TryCatch,
                SupervisorScope,
                SupervisorScope,
            ],
            Difficulty::WithSynchronizationAndExceptions => vec![
                Delay,
                Print,
                AsyncAwait,
                CoroutineScope,
                LaunchJoin,
                LaunchCancel,
                JobCompleteJoin,
                ScopeLaunch,
                ThrowException,
                TryCatch,
                SupervisorScope,
            ],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Difficulty::Simple => "simple",
            Difficulty::WithSynchronization => "sync",
            Difficulty::WithExceptions => "exceptions",
            Difficulty::WithSynchronizationAndExceptions => "sync-exceptions",
        }
    }

    pub fn from_name(name: &str) -> Option<Difficulty> {
        Difficulty::ALL.into_iter().find(|d| d.name() == name)
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Random tree builder for one session. Owns the session RNG and value pools.
pub struct Generator {
    rng: DetRng,
    values: ValueGenerator,
    kinds: Vec<StatementKind>,
}

impl Generator {
    pub fn new(kinds: Vec<StatementKind>, seed: u64) -> Self {
        Self {
            rng: DetRng::from_u64(seed),
            values: ValueGenerator::new(),
            kinds,
        }
    }

    /// Re-seed the value pools from the values `tree` still uses.
    pub fn restart_from(&mut self, tree: &Statement) {
        self.values.restart_from(tree);
    }

    /// Uniform pick among the allowed kinds that fit in `left` statements.
    /// The first statement of a block is never a usage pair or a print.
    fn random_kind(&mut self, left: usize, first_in_block: bool) -> StatementKind {
        let fitting: Vec<StatementKind> = self
            .kinds
            .iter()
            .copied()
            .filter(|k| k.statements_needed() <= left)
            .filter(|k| !first_in_block || (!k.has_usage() && *k != StatementKind::Print))
            .collect();
        self.rng
            .pick(&fitting)
            .copied()
            .unwrap_or(StatementKind::Print)
    }

    fn random_exception(&mut self) -> ExceptionKind {
        self.rng
            .pick(&ExceptionKind::ALL)
            .copied()
            .unwrap_or(ExceptionKind::Generic)
    }

    /// Body of a fresh block: one first-in-block statement.
    fn block_body(&mut self, left: usize) -> Result<Vec<Statement>, GenerationError> {
        let kind = self.random_kind(left, true);
        Ok(vec![self.generate_statement(kind, left)?])
    }

    /// Build the declaration part of `kind` with `left` statements available
    /// for it, its body and its usages.
    pub fn generate_statement(
        &mut self,
        kind: StatementKind,
        left: usize,
    ) -> Result<Statement, GenerationError> {
        let inner = left.saturating_sub(kind.statements_needed());
        let statement = match kind {
            StatementKind::Delay => Statement::delay(self.rng.range(1, 3) * 1000),
            StatementKind::Print => Statement::print(self.values.next_string()?),
            StatementKind::ThrowException => Statement::throw(self.random_exception()),
            StatementKind::JobCompleteJoin => Statement::job(self.values.next_job_name()?),
            StatementKind::Launch => Statement::launch(self.block_body(inner)?),
            StatementKind::ScopeLaunch => Statement::scope_launch(self.block_body(inner)?),
            StatementKind::CoroutineScope => Statement::coroutine_scope(self.block_body(inner)?),
            StatementKind::SupervisorScope => {
                Statement::supervisor_scope(self.block_body(inner)?)
            }
            StatementKind::TryCatch => {
                let catches = self.random_exception();
                Statement::try_catch(catches, self.block_body(inner)?)
            }
            StatementKind::LaunchJoin | StatementKind::LaunchCancel => {
                let var = self.values.next_job_name()?;
                Statement::launch_job(var, self.block_body(inner)?)
            }
            StatementKind::AsyncAwait => {
                let var = self.values.next_variable_name()?;
                let result = self.values.next_string()?;
                Statement::async_value(var, result, self.block_body(inner)?)
            }
        };
        Ok(statement)
    }

    /// Usage statements for a declaration built by [`Generator::generate_statement`].
    pub fn usages(kind: StatementKind, declaration: &Statement) -> Vec<Statement> {
        let Some(var) = declaration.declared_var() else {
            return Vec::new();
        };
        match (kind, &declaration.node) {
            (StatementKind::AsyncAwait, Node::Async { result, .. }) => {
                vec![Statement::print_await(var, result.clone())]
            }
            (StatementKind::LaunchJoin, _) => vec![Statement::join(var)],
            (StatementKind::LaunchCancel, _) => vec![Statement::cancel(var)],
            (StatementKind::JobCompleteJoin, _) => {
                vec![Statement::join(var), Statement::complete_job(var)]
            }
            _ => Vec::new(),
        }
    }

    /// Root scope holding a single first-in-block statement.
    pub fn initial_tree(&mut self, target: usize) -> Result<Statement, GenerationError> {
        // The root itself counts as one statement.
        let body = self.block_body(target.saturating_sub(1))?;
        Ok(Statement::coroutine_scope(body))
    }

    /// Add one randomly picked statement (with its usages) to `tree`, using at
    /// most `left` statements.
    pub fn add_random_statement(
        &mut self,
        tree: &Statement,
        left: usize,
    ) -> Result<Statement, GenerationError> {
        let kind = self.random_kind(left, false);
        let declaration = self.generate_statement(kind, left)?;
        let usages = Self::usages(kind, &declaration);
        trace!(?kind, left, added = declaration.count_statements() + usages.len(), "adding statement");

        let tree = match usages.len() {
            0 => {
                let point = self.rng.next_below(tree.insertion_points());
                tree.insert_at_point(point, declaration)
            }
            1 => {
                let point = self.rng.next_below(tree.insertion_points());
                let declaration_id = declaration.id;
                let tree = tree.insert_at_point(point, declaration);
                let mut usages = usages;
                let rng = &mut self.rng;
                match usages.pop() {
                    Some(usage) => tree.insert_after(declaration_id, usage, &mut |n| rng.next_below(n)),
                    None => tree,
                }
            }
            _ => {
                let mut previous = declaration.id;
                let mut tree = tree.insert_first(declaration);
                let rng = &mut self.rng;
                for usage in usages {
                    let usage_id = usage.id;
                    tree = tree.insert_after(previous, usage, &mut |n| rng.next_below(n));
                    previous = usage_id;
                }
                tree
            }
        };

        debug_assert_eq!(validate(&tree), Ok(()));
        Ok(tree)
    }

    /// Grow `tree` until it holds exactly `target` statements.
    pub fn grow(&mut self, tree: Statement, target: usize) -> Result<Statement, GenerationError> {
        let mut tree = tree;
        while tree.count_statements() < target {
            let left = target - tree.count_statements();
            tree = self.add_random_statement(&tree, left)?;
        }
        Ok(tree)
    }
}

/// Build a tree of exactly `target` statements from `kinds`.
pub fn generate(
    target: usize,
    kinds: &[StatementKind],
    seed: u64,
) -> Result<Statement, GenerationError> {
    if target < 2 {
        return Err(GenerationError::InvalidConfig(format!(
            "target must be at least 2 statements, got {}",
            target
        )));
    }
    let mut generator = Generator::new(kinds.to_vec(), seed);
    let tree = generator.initial_tree(target)?;
    generator.grow(tree, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_needed() {
        assert_eq!(StatementKind::Print.statements_needed(), 1);
        assert_eq!(StatementKind::Launch.statements_needed(), 2);
        assert_eq!(StatementKind::AsyncAwait.statements_needed(), 3);
        assert_eq!(StatementKind::JobCompleteJoin.statements_needed(), 3);
    }

    #[test]
    fn test_difficulty_names_round_trip() {
        for difficulty in Difficulty::ALL {
            assert_eq!(Difficulty::from_name(difficulty.name()), Some(difficulty));
        }
        assert_eq!(Difficulty::from_name("nope"), None);
    }

    #[test]
    fn test_first_in_block_excludes_usages_and_prints() {
        let mut generator = Generator::new(
            vec![StatementKind::Print, StatementKind::LaunchJoin],
            3,
        );
        for _ in 0..50 {
            // Nothing allowed remains, so the pick falls back to Print.
            assert_eq!(generator.random_kind(10, true), StatementKind::Print);
        }
    }

    #[test]
    fn test_pick_respects_budget() {
        let mut generator = Generator::new(Difficulty::WithExceptions.kinds(), 11);
        for _ in 0..100 {
            assert_eq!(generator.random_kind(1, false).statements_needed(), 1);
        }
    }

    #[test]
    fn test_generate_exact_count() {
        for difficulty in Difficulty::ALL {
            for seed in 0..20 {
                for target in [2, 3, 5, 10, 17] {
                    let tree = generate(target, &difficulty.kinds(), seed).unwrap();
                    assert_eq!(tree.count_statements(), target, "{} seed {}", difficulty, seed);
                    assert_eq!(validate(&tree), Ok(()));
                }
            }
        }
    }

    #[test]
    fn test_generate_rejects_tiny_targets() {
        assert!(matches!(
            generate(1, &Difficulty::Simple.kinds(), 0),
            Err(GenerationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_generate_is_deterministic() {
        let a = generate(12, &Difficulty::WithSynchronization.kinds(), 99).unwrap();
        let b = generate(12, &Difficulty::WithSynchronization.kinds(), 99).unwrap();
        assert_eq!(crate::render::render(&a), crate::render::render(&b));
    }

    #[test]
    fn test_delays_are_whole_seconds() {
        let tree = generate(30, &[StatementKind::Delay, StatementKind::Launch], 5).unwrap();
        tree.for_each(&mut |s| {
            if let Node::Delay { time } = s.node {
                assert!(time == 1000 || time == 2000);
            }
        });
    }
}
