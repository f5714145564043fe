//! Ambient task identity for adapter code paths.
//!
//! Adapter sources run synchronously on blocking threads; rather than thread
//! a task id and cancel token through every source method, the coordinator
//! scopes them here and the process runner picks them up at spawn time.

use std::cell::RefCell;

use crate::exec::CancelToken;
use crate::models::TaskId;

#[derive(Clone, Debug, Default)]
pub struct TaskScope {
    pub task_id: Option<TaskId>,
    pub cancel: Option<CancelToken>,
}

thread_local! {
    static CURRENT: RefCell<TaskScope> = RefCell::new(TaskScope::default());
}

pub fn current_task_id() -> Option<TaskId> {
    CURRENT.with(|slot| slot.borrow().task_id)
}

pub fn current_cancel_token() -> Option<CancelToken> {
    CURRENT.with(|slot| slot.borrow().cancel.clone())
}

pub fn scoped<R>(task_id: TaskId, cancel: CancelToken, operation: impl FnOnce() -> R) -> R {
    let previous = CURRENT.with(|slot| {
        slot.replace(TaskScope {
            task_id: Some(task_id),
            cancel: Some(cancel),
        })
    });
    let result = operation();
    CURRENT.with(|slot| slot.replace(previous));
    result
}
