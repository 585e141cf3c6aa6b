//! Test assertions for graph results.

use crate::core::TaskState;
use crate::pipeline::GraphExecutionResult;

/// Asserts that a node ended in `expected`.
pub fn assert_task_state(result: &GraphExecutionResult, task: &str, expected: TaskState) {
    let actual = result.state_of(task);
    assert_eq!(
        actual,
        Some(expected),
        "Expected task '{task}' to be {expected}, got {actual:?}"
    );
}

/// Asserts that a node succeeded.
pub fn assert_task_succeeded(result: &GraphExecutionResult, task: &str) {
    assert_task_state(result, task, TaskState::Succeeded);
}

/// Asserts that every node succeeded.
pub fn assert_run_succeeded(result: &GraphExecutionResult) {
    assert!(
        result.success,
        "Expected run to succeed, got error {:?}; failed tasks: {:?}",
        result.error,
        result.failed_tasks()
    );
}

/// Asserts that `first` succeeded before `second` became ready.
pub fn assert_succeeded_before_ready(result: &GraphExecutionResult, first: &str, second: &str) {
    let done = result.transition_index(first, TaskState::Succeeded);
    let ready = result.transition_index(second, TaskState::Ready);
    assert!(
        matches!((done, ready), (Some(d), Some(r)) if d < r),
        "Expected '{first}' to succeed before '{second}' became ready (positions {done:?} / {ready:?})"
    );
}

/// Asserts that a node's output holds `expected` under `key`.
pub fn assert_output_value(result: &GraphExecutionResult, task: &str, key: &str, expected: &serde_json::Value) {
    let actual = result.output_of(task).and_then(|output| output.get(key));
    assert_eq!(
        actual,
        Some(expected),
        "Expected value {expected:?} for '{task}.{key}', got {actual:?}"
    );
}
