//! Virtual-Time Evaluator
//!
//! Runs a program tree on a fresh [`Engine`] and records every print together
//! with the logical time it happened at. Launches become executor tasks in the
//! job tree, scopes run inline under a child job, and the run ends when the
//! root statement finishes or when no further progress is possible.

use crate::context::{Ctx, JobKind, JobOutcome};
use crate::engine::{Engine, EngineConfig, RunOutcome};
use crate::signal::Signal;
use crate::statement::{ExceptionKind, Node, Statement};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use tracing::trace;

/// Printed by a `try`/`catch` that intercepted an exception.
pub const CAUGHT_MESSAGE: &str = "Got exception";

/// A single observable output of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrintEvent {
    pub value: String,
    pub time: u64,
}

impl PrintEvent {
    pub fn new(value: impl Into<String>, time: u64) -> Self {
        Self {
            value: value.into(),
            time,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    Completed,
    UncaughtException,
    UncaughtCancellation,
    NeverCompletes,
}

impl Termination {
    pub fn marker(self) -> &'static str {
        match self {
            Termination::Completed => "(done)",
            Termination::UncaughtException => "(exception)",
            Termination::UncaughtCancellation => "(cancellation exception)",
            Termination::NeverCompletes => "(waiting forever)",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// Result of evaluating a program. Two evaluations are equivalent iff equal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    pub events: Vec<PrintEvent>,
    pub termination: Termination,
    pub end_time: u64,
}

impl Evaluation {
    /// Events followed by the terminal marker.
    fn timeline(&self) -> Vec<PrintEvent> {
        let mut all = self.events.clone();
        all.push(PrintEvent::new(self.termination.marker(), self.end_time));
        all
    }

    /// `[time] value` per event, marker last.
    pub fn lines(&self) -> Vec<String> {
        self.timeline()
            .iter()
            .map(|e| format!("[{}] {}", e.time, e.value))
            .collect()
    }

    /// Narrative form: values in order, with `(N sec)` wherever time passes.
    pub fn sequential(&self) -> Vec<String> {
        let timeline = self.timeline();
        let mut out = Vec::new();
        if let Some(first) = timeline.first() {
            if first.time != 0 {
                out.push(format!("({} sec)", first.time / 1000));
            }
        }
        for (i, event) in timeline.iter().enumerate() {
            out.push(event.value.clone());
            if let Some(next) = timeline.get(i + 1) {
                if next.time != event.time {
                    out.push(format!("({} sec)", next.time.saturating_sub(event.time) / 1000));
                }
            }
        }
        out
    }

    /// Whether the run never finishes or anything happens past `threshold`.
    pub fn hangs(&self, threshold: u64) -> bool {
        self.termination == Termination::NeverCompletes
            || self.events.iter().any(|e| e.time > threshold)
    }
}

/// Evaluate with the default horizon and budgets.
pub fn evaluate(tree: &Statement) -> Evaluation {
    evaluate_with(tree, EngineConfig::default())
}

pub fn evaluate_with(tree: &Statement, config: EngineConfig) -> Evaluation {
    let horizon = config.horizon;
    let mut engine = Engine::new(config);
    let outer = engine.root_ctx(JobKind::Scope);
    let background = engine.root_ctx(JobKind::Background);
    let interpreter = Interpreter::new(background.clone());

    let finished: Rc<Cell<Option<(Result<(), ExceptionKind>, u64)>>> = Rc::new(Cell::new(None));

    {
        let interpreter = interpreter.clone();
        let finished = finished.clone();
        let program = tree.clone();
        engine.spawn(async move {
            let result = interpreter.run_statement(&program, &outer).await;
            // Nothing that happens after the root returns is observable.
            interpreter.stop_recording();
            background.cancel();
            finished.set(Some((result, outer.now())));
        });
    }

    let done = finished.clone();
    let run = engine.run_until(move || {
        let value = done.get();
        value.is_some()
    });

    let (termination, end_time) = match (run, finished.get()) {
        (RunOutcome::Finished, Some((result, at))) => {
            let termination = match result {
                Ok(()) => Termination::Completed,
                Err(ExceptionKind::Cancellation) => Termination::UncaughtCancellation,
                Err(_) => Termination::UncaughtException,
            };
            (termination, at)
        }
        _ => (Termination::NeverCompletes, horizon),
    };

    let events = interpreter.take_events();
    drop(engine);

    Evaluation {
        events,
        termination,
        end_time,
    }
}

/// Runtime binding of a handle variable.
#[derive(Clone)]
enum Handle {
    Task(Ctx),
    Deferred { job: Ctx, result: String },
    Bare(Signal),
}

struct InterpreterInner {
    events: RefCell<Vec<PrintEvent>>,
    recording: Cell<bool>,
    handles: RefCell<HashMap<String, Handle>>,
    background: Ctx,
}

type Exec<'a> = Pin<Box<dyn Future<Output = Result<(), ExceptionKind>> + 'a>>;

#[derive(Clone)]
struct Interpreter(Rc<InterpreterInner>);

impl Interpreter {
    fn new(background: Ctx) -> Self {
        Interpreter(Rc::new(InterpreterInner {
            events: RefCell::new(Vec::new()),
            recording: Cell::new(true),
            handles: RefCell::new(HashMap::new()),
            background,
        }))
    }

    fn print(&self, ctx: &Ctx, value: &str) {
        if !self.0.recording.get() {
            return;
        }
        let time = ctx.now();
        trace!(value, time, "print");
        self.0.events.borrow_mut().push(PrintEvent::new(value, time));
    }

    fn stop_recording(&self) {
        self.0.recording.set(false);
    }

    fn take_events(&self) -> Vec<PrintEvent> {
        std::mem::take(&mut *self.0.events.borrow_mut())
    }

    fn bind(&self, var: &str, handle: Handle) {
        self.0.handles.borrow_mut().insert(var.to_string(), handle);
    }

    fn handle(&self, var: &str) -> Option<Handle> {
        self.0.handles.borrow().get(var).cloned()
    }

    fn spawn(&self, parent: &Ctx, body: &[Statement]) -> Ctx {
        let interpreter = self.clone();
        let body = body.to_vec();
        parent.launch(move |ctx| async move { interpreter.run_block(&body, &ctx).await })
    }

    fn run_block<'a>(&'a self, body: &'a [Statement], ctx: &'a Ctx) -> Exec<'a> {
        Box::pin(async move {
            for statement in body {
                self.run_statement(statement, ctx).await?;
            }
            Ok(())
        })
    }

    /// Run `body` inline under a new child job, wait for its children, then
    /// rethrow whatever the scope settled with.
    async fn run_scope(&self, kind: JobKind, body: &[Statement], ctx: &Ctx) -> Result<(), ExceptionKind> {
        let scope = ctx.child(kind);
        let result = self.run_block(body, &scope).await;
        scope.complete(result).await.into_result()
    }

    async fn run_statement(&self, statement: &Statement, ctx: &Ctx) -> Result<(), ExceptionKind> {
        match &statement.node {
            Node::Delay { time } => ctx
                .delay(*time)
                .await
                .map_err(|_| ExceptionKind::Cancellation),
            Node::Print { text } => {
                self.print(ctx, text);
                Ok(())
            }
            Node::ThrowException { kind } => Err(*kind),
            Node::Launch { body } => {
                self.spawn(ctx, body);
                Ok(())
            }
            Node::ScopeLaunch { body } => {
                self.spawn(&self.0.background, body);
                Ok(())
            }
            Node::CoroutineScope { body } => self.run_scope(JobKind::Scope, body, ctx).await,
            Node::SupervisorScope { body } => {
                self.run_scope(JobKind::Supervisor, body, ctx).await
            }
            Node::LaunchJob { var, body } => {
                let job = self.spawn(ctx, body);
                self.bind(var, Handle::Task(job));
                Ok(())
            }
            Node::Async { var, result, body } => {
                let job = self.spawn(ctx, body);
                self.bind(
                    var,
                    Handle::Deferred {
                        job,
                        result: result.clone(),
                    },
                );
                Ok(())
            }
            Node::TryCatch { catches, body } => match self.run_block(body, ctx).await {
                Err(thrown) if catches.catches(thrown) => {
                    self.print(ctx, CAUGHT_MESSAGE);
                    Ok(())
                }
                other => other,
            },
            Node::Job { var } => {
                self.bind(var, Handle::Bare(Signal::new()));
                Ok(())
            }
            Node::Join { var } => {
                let signal = match self.handle(var) {
                    Some(Handle::Task(job)) | Some(Handle::Deferred { job, .. }) => job.completion(),
                    Some(Handle::Bare(signal)) => signal,
                    None => return Ok(()),
                };
                signal
                    .wait(ctx)
                    .await
                    .map_err(|_| ExceptionKind::Cancellation)
            }
            Node::Cancel { var } => {
                match self.handle(var) {
                    Some(Handle::Task(job)) | Some(Handle::Deferred { job, .. }) => job.cancel(),
                    Some(Handle::Bare(signal)) => signal.fire(),
                    None => {}
                }
                Ok(())
            }
            Node::CompleteJob { var } => {
                if let Some(Handle::Bare(signal)) = self.handle(var) {
                    signal.fire();
                }
                Ok(())
            }
            Node::PrintAwait { var, text } => match self.handle(var) {
                Some(Handle::Deferred { job, result }) => {
                    job.completion()
                        .await_value(ctx)
                        .await
                        .map_err(|_| ExceptionKind::Cancellation)?;
                    job.outcome()
                        .unwrap_or(JobOutcome::Cancelled)
                        .into_result()?;
                    self.print(ctx, &result);
                    Ok(())
                }
                _ => {
                    self.print(ctx, text);
                    Ok(())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(body: Vec<Statement>) -> Statement {
        Statement::coroutine_scope(body)
    }

    #[test]
    fn test_lines_and_sequential() {
        let evaluation = Evaluation {
            events: vec![
                PrintEvent::new("A", 1000),
                PrintEvent::new("B", 1000),
                PrintEvent::new("C", 3000),
            ],
            termination: Termination::Completed,
            end_time: 3000,
        };
        assert_eq!(
            evaluation.lines(),
            vec!["[1000] A", "[1000] B", "[3000] C", "[3000] (done)"]
        );
        assert_eq!(
            evaluation.sequential(),
            vec!["(1 sec)", "A", "B", "(2 sec)", "C", "(done)"]
        );
    }

    #[test]
    fn test_empty_program_completes_at_zero() {
        let evaluation = evaluate(&root(vec![]));
        assert!(evaluation.events.is_empty());
        assert_eq!(evaluation.termination, Termination::Completed);
        assert_eq!(evaluation.end_time, 0);
        assert_eq!(evaluation.sequential(), vec!["(done)"]);
    }

    #[test]
    fn test_uncaught_kinds() {
        let thrown = evaluate(&root(vec![Statement::throw(ExceptionKind::Custom)]));
        assert_eq!(thrown.termination, Termination::UncaughtException);

        let cancelled = evaluate(&root(vec![Statement::throw(ExceptionKind::Cancellation)]));
        assert_eq!(cancelled.termination, Termination::UncaughtCancellation);
    }

    #[test]
    fn test_never_completes_ends_at_horizon() {
        let evaluation = evaluate(&root(vec![
            Statement::print("A"),
            Statement::job("job1"),
            Statement::join("job1"),
        ]));
        assert_eq!(evaluation.events, vec![PrintEvent::new("A", 0)]);
        assert_eq!(evaluation.termination, Termination::NeverCompletes);
        assert_eq!(evaluation.end_time, crate::engine::WAIT_FOREVER_HORIZON);
        assert!(evaluation.hangs(1_000_000));
    }

    #[test]
    fn test_unbound_usages() {
        let evaluation = evaluate(&root(vec![
            Statement::join("job9"),
            Statement::cancel("job9"),
            Statement::complete_job("job9"),
            Statement::print_await("value9", "X"),
        ]));
        assert_eq!(evaluation.events, vec![PrintEvent::new("X", 0)]);
        assert_eq!(evaluation.termination, Termination::Completed);
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let tree = root(vec![
            Statement::launch(vec![Statement::delay(1000), Statement::print("A")]),
            Statement::async_value("value1", "B", vec![Statement::delay(2000)]),
            Statement::print_await("value1", "B"),
        ]);
        assert_eq!(evaluate(&tree), evaluate(&tree));
    }
}
