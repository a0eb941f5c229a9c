//! Routing of persisted VM work jobs to registered handlers.

mod context;
mod dispatcher;
mod fault;
mod handler;

pub use context::{CallContext, ContextListener, ContextScope, TracingContextListener};
pub use dispatcher::{AsyncJobDispatcher, VM_WORK_JOB_DISPATCHER, VmWorkJobDispatcher};
pub use fault::{FaultKind, FaultReport, marshal_result};
pub use handler::{HandlerRegistry, HandlerRegistryBuilder, WorkHandler};
