use std::ops::Deref;

use tracing::{Span, debug, info_span};

use crate::job::{JobId, JobRecord};
use crate::work::VmWork;

/// Identity a handler acts on behalf of, valid for one handler invocation.
///
/// The context is handed to the handler explicitly. It is only ever
/// reachable through a [`ContextScope`], which reports the release when it
/// goes out of scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub user_id: u64,
    pub account_id: u64,
    pub job_id: JobId,
    pub origin: Option<String>,
}

impl CallContext {
    pub fn new(user_id: u64, account_id: u64, job_id: JobId) -> Self {
        Self {
            user_id,
            account_id,
            job_id,
            origin: None,
        }
    }

    pub(crate) fn for_job(job: &JobRecord, work: &VmWork) -> Self {
        Self {
            user_id: work.user_id,
            account_id: work.account_id,
            job_id: job.id,
            origin: job.related.clone(),
        }
    }

    /// Register the context and return the guard that unregisters it.
    pub fn enter(self, listener: &dyn ContextListener) -> ContextScope<'_> {
        listener.registered(&self);
        ContextScope {
            context: self,
            listener,
        }
    }

    /// Span carrying the context's identity, used to instrument the
    /// handler future.
    pub fn span(&self) -> Span {
        info_span!(
            "vm_work",
            job_id = self.job_id,
            user_id = self.user_id,
            account_id = self.account_id,
        )
    }
}

/// Observes contexts being registered and released.
pub trait ContextListener: Send + Sync {
    fn registered(&self, context: &CallContext);
    fn unregistered(&self, context: &CallContext);
}

/// Default listener; logs at `debug`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingContextListener;

impl ContextListener for TracingContextListener {
    fn registered(&self, context: &CallContext) {
        debug!(
            job_id = context.job_id,
            user_id = context.user_id,
            account_id = context.account_id,
            "call context registered"
        );
    }

    fn unregistered(&self, context: &CallContext) {
        debug!(job_id = context.job_id, "call context unregistered");
    }
}

/// Live registration of a [`CallContext`]. Dropping it unregisters.
pub struct ContextScope<'a> {
    context: CallContext,
    listener: &'a dyn ContextListener,
}

impl Deref for ContextScope<'_> {
    type Target = CallContext;

    fn deref(&self) -> &CallContext {
        &self.context
    }
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        self.listener.unregistered(&self.context);
    }
}
