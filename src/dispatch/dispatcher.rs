use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::FutureExt;
use tracing::{Instrument, debug, error};

use super::context::{CallContext, ContextListener, TracingContextListener};
use super::fault::marshal_result;
use super::handler::HandlerRegistry;
use crate::error::DispatchError;
use crate::job::{JobCompleter, JobCompletion, JobOutcome, JobRecord, JobStatus, RESULT_CODE_NONE};
use crate::work::{VmWork, WorkType, WorkTypeRegistry};

/// Name the VM work dispatcher is registered under with the job
/// infrastructure.
pub const VM_WORK_JOB_DISPATCHER: &str = "VmWorkJobDispatcher";

/// Entry point the job infrastructure calls for each job it schedules.
///
/// `run_job` returns nothing: the outcome is always reported through the
/// dispatcher's completer.
#[async_trait]
pub trait AsyncJobDispatcher: Send + Sync {
    fn name(&self) -> &str;

    async fn run_job(&self, job: &JobRecord);
}

/// Decodes VM work jobs and routes them to the handler named in the work
/// item.
pub struct VmWorkJobDispatcher {
    work_types: Arc<WorkTypeRegistry>,
    handlers: Option<Arc<HandlerRegistry>>,
    completer: Arc<dyn JobCompleter>,
    context_listener: Arc<dyn ContextListener>,
}

impl VmWorkJobDispatcher {
    pub fn new(work_types: Arc<WorkTypeRegistry>, completer: Arc<dyn JobCompleter>) -> Self {
        Self {
            work_types,
            handlers: None,
            completer,
            context_listener: Arc::new(TracingContextListener),
        }
    }

    pub fn with_handlers(mut self, handlers: Arc<HandlerRegistry>) -> Self {
        self.handlers = Some(handlers);
        self
    }

    pub fn with_context_listener(mut self, listener: Arc<dyn ContextListener>) -> Self {
        self.context_listener = listener;
        self
    }

    pub fn handlers(&self) -> Option<&HandlerRegistry> {
        self.handlers.as_deref()
    }

    /// Run one job to its single completion, which is both sent to the
    /// completer and returned.
    pub async fn dispatch(&self, job: &JobRecord) -> JobCompletion {
        let completion = match self.execute(job).await {
            Ok(outcome) => JobCompletion {
                job_id: job.id,
                status: outcome.status,
                result_code: RESULT_CODE_NONE,
                message: outcome.message,
            },
            Err(err) => {
                log_failure(job, &err);
                JobCompletion {
                    job_id: job.id,
                    status: JobStatus::Failed,
                    result_code: RESULT_CODE_NONE,
                    message: marshal_result(&err),
                }
            }
        };
        self.completer.complete(completion.clone()).await;
        completion
    }

    async fn execute(&self, job: &JobRecord) -> Result<JobOutcome, DispatchError> {
        let work_type = self
            .work_types
            .resolve(&job.cmd)
            .ok_or_else(|| DispatchError::Resolution(job.cmd.clone()))?;
        let work = decode(work_type, &job.cmd_info)?;

        debug!(
            job_id = job.id,
            cmd = %job.cmd,
            vm_id = work.vm_id,
            origin = job.origin(),
            "Run VM work job"
        );
        let result = self.invoke(job, &work).await;
        debug!(
            job_id = job.id,
            cmd = %job.cmd,
            vm_id = work.vm_id,
            origin = job.origin(),
            "Done with run of VM work job"
        );
        result
    }

    async fn invoke(&self, job: &JobRecord, work: &VmWork) -> Result<JobOutcome, DispatchError> {
        let handlers = self
            .handlers
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or(DispatchError::Configuration)?;
        let handler = handlers
            .get(&work.handler_name)
            .ok_or_else(|| DispatchError::Routing(work.handler_name.clone()))?;

        let context = CallContext::for_job(job, work);
        let span = context.span();
        let scope = context.enter(self.context_listener.as_ref());
        let result = AssertUnwindSafe(handler.handle_vm_work(&scope, work))
            .catch_unwind()
            .instrument(span)
            .await;
        drop(scope);

        match result {
            Ok(Ok(outcome)) if !outcome.status.is_terminal() => {
                Err(DispatchError::Unexpected(anyhow!(
                    "handler {} returned non-terminal status {}",
                    work.handler_name,
                    outcome.status
                )))
            }
            Ok(outcome) => outcome.map_err(DispatchError::from),
            Err(panic) => Err(DispatchError::Unexpected(anyhow!(
                "handler {} panicked: {}",
                work.handler_name,
                panic_message(panic.as_ref())
            ))),
        }
    }
}

#[async_trait]
impl AsyncJobDispatcher for VmWorkJobDispatcher {
    fn name(&self) -> &str {
        VM_WORK_JOB_DISPATCHER
    }

    async fn run_job(&self, job: &JobRecord) {
        self.dispatch(job).await;
    }
}

/// A decoder that errors or panics is treated the same as one that
/// produced nothing.
fn decode(work_type: &WorkType, raw: &str) -> Result<VmWork, DispatchError> {
    let reason = match catch_unwind(AssertUnwindSafe(|| work_type.decode(raw))) {
        Ok(Ok(work)) => return Ok(work),
        Ok(Err(err)) => format!("{err:#}"),
        Err(panic) => format!("decoder panicked: {}", panic_message(panic.as_ref())),
    };
    Err(DispatchError::Deserialization {
        cmd: work_type.name().to_string(),
        reason,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn log_failure(job: &JobRecord, err: &DispatchError) {
    match err {
        DispatchError::Resolution(cmd) => {
            error!(job_id = job.id, origin = job.origin(), "VM work class {cmd} is not found");
        }
        DispatchError::Deserialization { cmd, reason } => {
            error!(
                job_id = job.id,
                origin = job.origin(),
                cmd_info = %job.cmd_info,
                "Unable to deserialize VM work {cmd}: {reason}"
            );
        }
        DispatchError::Configuration => {
            error!(
                job_id = job.id,
                cmd = %job.cmd,
                origin = job.origin(),
                "Invalid startup configuration, no work job handler is found"
            );
        }
        DispatchError::Routing(name) => {
            error!(
                job_id = job.id,
                cmd = %job.cmd,
                origin = job.origin(),
                "Unable to find work job handler. handler name: {name}"
            );
        }
        DispatchError::InvalidParameter(message) => {
            error!(origin = job.origin(), "Unable to complete {job}: {message}");
        }
        DispatchError::Unexpected(inner) => {
            error!(origin = job.origin(), error = ?inner, "Unable to complete {job}");
        }
    }
}
