//! Generation Session
//!
//! The outer loop: grow to the target size, simplify, and repeat from the
//! survivors until a grown tree comes out of simplification intact.

use crate::error::GenerationError;
use crate::evaluator::{evaluate, Evaluation};
use crate::generator::{Difficulty, Generator, StatementKind};
use crate::simplifier::simplify;
use crate::statement::{Node, Statement};
use tracing::{debug, info};

/// Configuration for a generation session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Exact size of the produced program, root included. At least 2.
    pub target_statements: usize,
    pub kinds: Vec<StatementKind>,
    pub seed: u64,
    /// Grow/simplify rounds before giving up.
    pub max_rounds: usize,
    /// Reject programs where two prints happen at the same time.
    pub separate_simultaneous_prints: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_statements: 10,
            kinds: Difficulty::Simple.kinds(),
            seed: 0,
            max_rounds: 500,
            separate_simultaneous_prints: false,
        }
    }
}

impl SessionConfig {
    pub fn for_difficulty(difficulty: Difficulty, target_statements: usize, seed: u64) -> Self {
        Self {
            target_statements,
            kinds: difficulty.kinds(),
            seed,
            ..Default::default()
        }
    }
}

/// A generated program together with its expected output.
#[derive(Clone, Debug)]
pub struct Challenge {
    pub program: Statement,
    pub expected: Evaluation,
    pub rounds: usize,
}

pub struct Session {
    config: SessionConfig,
    generator: Generator,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, GenerationError> {
        if config.target_statements < 2 {
            return Err(GenerationError::InvalidConfig(format!(
                "target must be at least 2 statements, got {}",
                config.target_statements
            )));
        }
        if config.kinds.is_empty() {
            return Err(GenerationError::InvalidConfig(
                "no statement kinds allowed".to_string(),
            ));
        }
        if config.max_rounds == 0 {
            return Err(GenerationError::InvalidConfig(
                "max_rounds must be positive".to_string(),
            ));
        }
        let generator = Generator::new(config.kinds.clone(), config.seed);
        Ok(Self { config, generator })
    }

    pub fn run(&mut self) -> Result<Challenge, GenerationError> {
        let target = self.config.target_statements;
        let mut tree = self.generator.initial_tree(target)?;

        for round in 1..=self.config.max_rounds {
            self.generator.restart_from(&tree);
            let grown = self.generator.grow(tree, target)?;
            let mut simplified = simplify(&grown);
            if self.config.separate_simultaneous_prints {
                simplified = separate_simultaneous_prints(&simplified);
            }

            debug!(
                round,
                grown = grown.count_statements(),
                simplified = simplified.count_statements(),
                blocks = simplified.count_blocks(),
                depth = simplified.depth(),
                "session round"
            );

            if simplified.count_statements() >= target {
                let expected = evaluate(&simplified);
                info!(rounds = round, statements = target, "challenge generated");
                return Ok(Challenge {
                    program: simplified,
                    expected,
                    rounds: round,
                });
            }
            tree = simplified;
        }

        Err(GenerationError::DidNotConverge {
            rounds: self.config.max_rounds,
        })
    }
}

/// Remove the print (or awaited print) behind the first pair of events
/// sharing a timestamp.
pub fn separate_simultaneous_prints(tree: &Statement) -> Statement {
    let events = evaluate(tree).events;
    for pair in events.windows(2) {
        if pair[0].time != pair[1].time {
            continue;
        }
        for event in [&pair[1], &pair[0]] {
            let found = tree.find(|s| match &s.node {
                Node::Print { text } | Node::PrintAwait { text, .. } => *text == event.value,
                _ => false,
            });
            if let Some(print) = found {
                debug!(value = %event.value, time = event.time, "separating simultaneous prints");
                return tree.remove(print.id);
            }
        }
    }
    tree.clone()
}

/// Convenience wrapper: run a whole session for a difficulty.
pub fn generate_challenge(
    difficulty: Difficulty,
    target_statements: usize,
    seed: u64,
) -> Result<Challenge, GenerationError> {
    Session::new(SessionConfig::for_difficulty(difficulty, target_statements, seed))?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simplifier::hangs;

    #[test]
    fn test_rejects_bad_config() {
        let config = SessionConfig {
            target_statements: 1,
            ..Default::default()
        };
        assert!(matches!(Session::new(config), Err(GenerationError::InvalidConfig(_))));

        let config = SessionConfig {
            kinds: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(Session::new(config), Err(GenerationError::InvalidConfig(_))));
    }

    #[test]
    fn test_session_hits_target() {
        for seed in 0..5 {
            let challenge = generate_challenge(Difficulty::Simple, 6, seed).unwrap();
            assert_eq!(challenge.program.count_statements(), 6);
            assert_eq!(challenge.expected, evaluate(&challenge.program));
            assert!(!hangs(&challenge.program));
            assert!(challenge.rounds >= 1);
        }
    }

    #[test]
    fn test_session_is_deterministic() {
        let a = generate_challenge(Difficulty::WithSynchronization, 7, 42).unwrap();
        let b = generate_challenge(Difficulty::WithSynchronization, 7, 42).unwrap();
        assert_eq!(crate::render::render(&a.program), crate::render::render(&b.program));
        assert_eq!(a.expected, b.expected);
    }

    #[test]
    fn test_separate_simultaneous_prints() {
        let tree = Statement::coroutine_scope(vec![
            Statement::print("A"),
            Statement::print("B"),
            Statement::delay(1000),
            Statement::print("C"),
        ]);
        let separated = separate_simultaneous_prints(&tree);
        let texts: Vec<_> = evaluate(&separated)
            .events
            .into_iter()
            .map(|e| e.value)
            .collect();
        assert_eq!(texts, vec!["A", "C"]);
    }

    #[test]
    fn test_separated_session_has_distinct_times() {
        let config = SessionConfig {
            separate_simultaneous_prints: true,
            ..SessionConfig::for_difficulty(Difficulty::Simple, 5, 3)
        };
        let challenge = Session::new(config).unwrap().run().unwrap();
        let events = &challenge.expected.events;
        assert!(events.windows(2).all(|w| w[0].time != w[1].time));
    }
}
