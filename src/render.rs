//! Renders a program tree as Kotlin coroutine source text.

use crate::evaluator::CAUGHT_MESSAGE;
use crate::statement::{Node, Statement};

const INDENT: &str = "    ";

pub fn render(statement: &Statement) -> String {
    let mut lines = Vec::new();
    render_into(statement, 0, &mut lines);
    lines.join("\n")
}

fn line(lines: &mut Vec<String>, depth: usize, text: impl AsRef<str>) {
    lines.push(format!("{}{}", INDENT.repeat(depth), text.as_ref()));
}

fn block(lines: &mut Vec<String>, depth: usize, header: String, body: &[Statement]) {
    line(lines, depth, format!("{} {{", header));
    for statement in body {
        render_into(statement, depth + 1, lines);
    }
}

fn render_into(statement: &Statement, depth: usize, lines: &mut Vec<String>) {
    match &statement.node {
        Node::Delay { time } => line(lines, depth, format!("delay({})", time)),
        Node::Print { text } => line(lines, depth, format!("println(\"{}\")", text)),
        Node::ThrowException { kind } => {
            line(lines, depth, format!("throw {}()", kind.class_name()))
        }
        Node::Launch { body } => {
            block(lines, depth, "launch".to_string(), body);
            line(lines, depth, "}");
        }
        Node::ScopeLaunch { body } => {
            block(lines, depth, "backgroundScope.launch".to_string(), body);
            line(lines, depth, "}");
        }
        Node::CoroutineScope { body } => {
            block(lines, depth, "coroutineScope".to_string(), body);
            line(lines, depth, "}");
        }
        Node::SupervisorScope { body } => {
            block(lines, depth, "supervisorScope".to_string(), body);
            line(lines, depth, "}");
        }
        Node::LaunchJob { var, body } => {
            block(lines, depth, format!("val {} = launch", var), body);
            line(lines, depth, "}");
        }
        Node::Async { var, result, body } => {
            block(lines, depth, format!("val {} = async", var), body);
            line(lines, depth + 1, format!("\"{}\"", result));
            line(lines, depth, "}");
        }
        Node::TryCatch { catches, body } => {
            block(lines, depth, "try".to_string(), body);
            line(lines, depth, format!("}} catch (e: {}) {{", catches.class_name()));
            line(lines, depth + 1, format!("println(\"{}\")", CAUGHT_MESSAGE));
            line(lines, depth, "}");
        }
        Node::Job { var } => line(lines, depth, format!("val {} = Job()", var)),
        Node::Join { var } => line(lines, depth, format!("{}.join()", var)),
        Node::Cancel { var } => line(lines, depth, format!("{}.cancel()", var)),
        Node::PrintAwait { var, .. } => line(lines, depth, format!("println({}.await())", var)),
        Node::CompleteJob { var } => line(lines, depth, format!("{}.complete()", var)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::ExceptionKind;

    #[test]
    fn test_render_nested() {
        let tree = Statement::coroutine_scope(vec![
            Statement::launch_job("job1", vec![Statement::delay(1000), Statement::print("A")]),
            Statement::async_value("value1", "B", vec![Statement::delay(2000)]),
            Statement::print_await("value1", "B"),
            Statement::join("job1"),
        ]);
        let expected = "\
coroutineScope {
    val job1 = launch {
        delay(1000)
        println(\"A\")
    }
    val value1 = async {
        delay(2000)
        \"B\"
    }
    println(value1.await())
    job1.join()
}";
        assert_eq!(render(&tree), expected);
    }

    #[test]
    fn test_render_exceptions() {
        let tree = Statement::supervisor_scope(vec![Statement::try_catch(
            ExceptionKind::Custom,
            vec![Statement::throw(ExceptionKind::Cancellation)],
        )]);
        let expected = "\
supervisorScope {
    try {
        throw CancellationException()
    } catch (e: MyException) {
        println(\"Got exception\")
    }
}";
        assert_eq!(render(&tree), expected);
    }

    #[test]
    fn test_render_jobs_and_background() {
        let tree = Statement::coroutine_scope(vec![
            Statement::job("job2"),
            Statement::scope_launch(vec![Statement::complete_job("job2")]),
            Statement::cancel("job2"),
        ]);
        let expected = "\
coroutineScope {
    val job2 = Job()
    backgroundScope.launch {
        job2.complete()
    }
    job2.cancel()
}";
        assert_eq!(render(&tree), expected);
    }
}
