//! Value Generator
//!
//! Fresh names and print literals for one generation session. Each pool is an
//! ordered queue; restarting a pool refills it from its seed minus the values
//! a surviving tree already uses, so regenerated statements never collide with
//! existing ones.

use crate::error::{GenerationError, Pool};
use crate::statement::{Node, Statement};
use std::collections::{HashSet, VecDeque};

const POOL_SIZE: usize = 1000;

fn variable_seed() -> impl Iterator<Item = String> {
    (1..=POOL_SIZE).map(|i| format!("value{}", i))
}

fn job_seed() -> impl Iterator<Item = String> {
    (1..=POOL_SIZE).map(|i| format!("job{}", i))
}

fn string_seed() -> impl Iterator<Item = String> {
    ('A'..='Z')
        .map(|c| c.to_string())
        .chain((1..=POOL_SIZE).map(|i| format!("v{}", i)))
}

fn refill(seed: impl Iterator<Item = String>, used: &HashSet<String>) -> VecDeque<String> {
    seed.filter(|v| !used.contains(v)).collect()
}

#[derive(Clone, Debug)]
pub struct ValueGenerator {
    variable_names: VecDeque<String>,
    job_names: VecDeque<String>,
    strings: VecDeque<String>,
}

impl Default for ValueGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueGenerator {
    pub fn new() -> Self {
        let none = HashSet::new();
        Self {
            variable_names: refill(variable_seed(), &none),
            job_names: refill(job_seed(), &none),
            strings: refill(string_seed(), &none),
        }
    }

    pub fn next_variable_name(&mut self) -> Result<String, GenerationError> {
        self.variable_names
            .pop_front()
            .ok_or(GenerationError::PoolExhausted {
                pool: Pool::VariableNames,
            })
    }

    pub fn next_job_name(&mut self) -> Result<String, GenerationError> {
        self.job_names
            .pop_front()
            .ok_or(GenerationError::PoolExhausted {
                pool: Pool::JobNames,
            })
    }

    pub fn next_string(&mut self) -> Result<String, GenerationError> {
        self.strings
            .pop_front()
            .ok_or(GenerationError::PoolExhausted { pool: Pool::Strings })
    }

    pub fn restart_variable_names(&mut self, used: &HashSet<String>) {
        self.variable_names = refill(variable_seed(), used);
    }

    pub fn restart_job_names(&mut self, used: &HashSet<String>) {
        self.job_names = refill(job_seed(), used);
    }

    pub fn restart_strings(&mut self, used: &HashSet<String>) {
        self.strings = refill(string_seed(), used);
    }

    /// Restart all three pools from the values `tree` still uses.
    pub fn restart_from(&mut self, tree: &Statement) {
        let mut jobs = HashSet::new();
        let mut variables = HashSet::new();
        let mut strings = HashSet::new();
        tree.for_each(&mut |s| match &s.node {
            Node::LaunchJob { var, .. } | Node::Job { var } => {
                jobs.insert(var.clone());
            }
            Node::Async { var, result, .. } => {
                variables.insert(var.clone());
                strings.insert(result.clone());
            }
            Node::Print { text } | Node::PrintAwait { text, .. } => {
                strings.insert(text.clone());
            }
            _ => {}
        });
        self.restart_job_names(&jobs);
        self.restart_variable_names(&variables);
        self.restart_strings(&strings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_order() {
        let mut values = ValueGenerator::new();
        assert_eq!(values.next_variable_name().unwrap(), "value1");
        assert_eq!(values.next_job_name().unwrap(), "job1");
        assert_eq!(values.next_string().unwrap(), "A");
        assert_eq!(values.next_string().unwrap(), "B");
    }

    #[test]
    fn test_strings_continue_after_alphabet() {
        let mut values = ValueGenerator::new();
        for _ in 0..26 {
            values.next_string().unwrap();
        }
        assert_eq!(values.next_string().unwrap(), "v1");
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let mut values = ValueGenerator::new();
        for _ in 0..POOL_SIZE {
            values.next_job_name().unwrap();
        }
        assert_eq!(
            values.next_job_name(),
            Err(GenerationError::PoolExhausted {
                pool: Pool::JobNames
            })
        );
    }

    #[test]
    fn test_restart_skips_used_values() {
        let tree = Statement::coroutine_scope(vec![
            Statement::print("A"),
            Statement::async_value("value1", "C", vec![]),
            Statement::print_await("value1", "C"),
            Statement::job("job1"),
        ]);
        let mut values = ValueGenerator::new();
        for _ in 0..5 {
            values.next_string().unwrap();
        }
        values.restart_from(&tree);
        assert_eq!(values.next_string().unwrap(), "B");
        assert_eq!(values.next_string().unwrap(), "D");
        assert_eq!(values.next_variable_name().unwrap(), "value2");
        assert_eq!(values.next_job_name().unwrap(), "job2");
    }
}
