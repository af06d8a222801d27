//! Statement Model
//!
//! An immutable tree of structured-concurrency statements. Every node carries
//! a process-unique id so that two nodes with equal payloads (two `Print("A")`
//! for instance) remain distinguishable during removal and lookup.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static STATEMENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_statement_id() -> StatementId {
    StatementId(STATEMENT_ID_COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// Identity of a statement node. Stable across rewrites that keep the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(pub u64);

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Exception kinds a simulated program can throw or catch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    Cancellation,
    Generic,
    Custom,
}

impl ExceptionKind {
    pub const ALL: [ExceptionKind; 3] = [
        ExceptionKind::Cancellation,
        ExceptionKind::Generic,
        ExceptionKind::Custom,
    ];

    /// Whether a `catch` of `self` intercepts a raised `thrown`.
    /// `Generic` is the common supertype of every kind.
    pub fn catches(self, thrown: ExceptionKind) -> bool {
        self == ExceptionKind::Generic || self == thrown
    }

    pub fn class_name(self) -> &'static str {
        match self {
            ExceptionKind::Cancellation => "CancellationException",
            ExceptionKind::Generic => "Exception",
            ExceptionKind::Custom => "MyException",
        }
    }
}

/// Payload of a statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Delay { time: u64 },
    Print { text: String },
    ThrowException { kind: ExceptionKind },
    Launch { body: Vec<Statement> },
    ScopeLaunch { body: Vec<Statement> },
    CoroutineScope { body: Vec<Statement> },
    SupervisorScope { body: Vec<Statement> },
    LaunchJob { var: String, body: Vec<Statement> },
    Async { var: String, result: String, body: Vec<Statement> },
    TryCatch { catches: ExceptionKind, body: Vec<Statement> },
    Job { var: String },
    Join { var: String },
    Cancel { var: String },
    PrintAwait { var: String, text: String },
    CompleteJob { var: String },
}

/// A node in the program tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    pub id: StatementId,
    pub node: Node,
}

impl Statement {
    /// Wrap a payload with a freshly allocated id.
    pub fn new(node: Node) -> Self {
        Self {
            id: next_statement_id(),
            node,
        }
    }

    pub fn delay(time: u64) -> Self {
        Self::new(Node::Delay { time })
    }

    pub fn print(text: impl Into<String>) -> Self {
        Self::new(Node::Print { text: text.into() })
    }

    pub fn throw(kind: ExceptionKind) -> Self {
        Self::new(Node::ThrowException { kind })
    }

    pub fn launch(body: Vec<Statement>) -> Self {
        Self::new(Node::Launch { body })
    }

    pub fn scope_launch(body: Vec<Statement>) -> Self {
        Self::new(Node::ScopeLaunch { body })
    }

    pub fn coroutine_scope(body: Vec<Statement>) -> Self {
        Self::new(Node::CoroutineScope { body })
    }

    pub fn supervisor_scope(body: Vec<Statement>) -> Self {
        Self::new(Node::SupervisorScope { body })
    }

    pub fn launch_job(var: impl Into<String>, body: Vec<Statement>) -> Self {
        Self::new(Node::LaunchJob {
            var: var.into(),
            body,
        })
    }

    pub fn async_value(
        var: impl Into<String>,
        result: impl Into<String>,
        body: Vec<Statement>,
    ) -> Self {
        Self::new(Node::Async {
            var: var.into(),
            result: result.into(),
            body,
        })
    }

    pub fn try_catch(catches: ExceptionKind, body: Vec<Statement>) -> Self {
        Self::new(Node::TryCatch { catches, body })
    }

    pub fn job(var: impl Into<String>) -> Self {
        Self::new(Node::Job { var: var.into() })
    }

    pub fn join(var: impl Into<String>) -> Self {
        Self::new(Node::Join { var: var.into() })
    }

    pub fn cancel(var: impl Into<String>) -> Self {
        Self::new(Node::Cancel { var: var.into() })
    }

    pub fn print_await(var: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Node::PrintAwait {
            var: var.into(),
            text: text.into(),
        })
    }

    pub fn complete_job(var: impl Into<String>) -> Self {
        Self::new(Node::CompleteJob { var: var.into() })
    }

    /// Children of a block statement, `None` for leaves.
    pub fn body(&self) -> Option<&[Statement]> {
        match &self.node {
            Node::Launch { body }
            | Node::ScopeLaunch { body }
            | Node::CoroutineScope { body }
            | Node::SupervisorScope { body }
            | Node::LaunchJob { body, .. }
            | Node::Async { body, .. }
            | Node::TryCatch { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_block(&self) -> bool {
        self.body().is_some()
    }

    /// Rebuild a block with new children, keeping id and payload.
    /// Leaves are returned unchanged.
    pub fn with_body(&self, statements: Vec<Statement>) -> Statement {
        let node = match &self.node {
            Node::Launch { .. } => Node::Launch { body: statements },
            Node::ScopeLaunch { .. } => Node::ScopeLaunch { body: statements },
            Node::CoroutineScope { .. } => Node::CoroutineScope { body: statements },
            Node::SupervisorScope { .. } => Node::SupervisorScope { body: statements },
            Node::LaunchJob { var, .. } => Node::LaunchJob {
                var: var.clone(),
                body: statements,
            },
            Node::Async { var, result, .. } => Node::Async {
                var: var.clone(),
                result: result.clone(),
                body: statements,
            },
            Node::TryCatch { catches, .. } => Node::TryCatch {
                catches: *catches,
                body: statements,
            },
            leaf => leaf.clone(),
        };
        Statement { id: self.id, node }
    }

    /// Variable bound by a handle-producing statement.
    pub fn declared_var(&self) -> Option<&str> {
        match &self.node {
            Node::LaunchJob { var, .. } | Node::Async { var, .. } | Node::Job { var } => {
                Some(var)
            }
            _ => None,
        }
    }

    /// Variable referenced by a usage leaf.
    pub fn used_var(&self) -> Option<&str> {
        match &self.node {
            Node::Join { var }
            | Node::Cancel { var }
            | Node::PrintAwait { var, .. }
            | Node::CompleteJob { var } => Some(var),
            _ => None,
        }
    }

    pub fn is_print(&self) -> bool {
        matches!(self.node, Node::Print { .. })
    }

    pub fn is_delay(&self) -> bool {
        matches!(self.node, Node::Delay { .. })
    }

    /// Short kind label, used in logs and invariant messages.
    pub fn label(&self) -> &'static str {
        match &self.node {
            Node::Delay { .. } => "Delay",
            Node::Print { .. } => "Print",
            Node::ThrowException { .. } => "ThrowException",
            Node::Launch { .. } => "Launch",
            Node::ScopeLaunch { .. } => "ScopeLaunch",
            Node::CoroutineScope { .. } => "CoroutineScope",
            Node::SupervisorScope { .. } => "SupervisorScope",
            Node::LaunchJob { .. } => "LaunchJob",
            Node::Async { .. } => "Async",
            Node::TryCatch { .. } => "TryCatch",
            Node::Job { .. } => "Job",
            Node::Join { .. } => "Join",
            Node::Cancel { .. } => "Cancel",
            Node::PrintAwait { .. } => "PrintAwait",
            Node::CompleteJob { .. } => "CompleteJob",
        }
    }
}
