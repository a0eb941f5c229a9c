use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::context::CallContext;
use crate::error::HandlerError;
use crate::job::JobOutcome;
use crate::work::VmWork;

/// Business logic for one family of VM work.
///
/// A handler gets the decoded work item and the identity it acts for, and
/// reports a status and message. Returning an error fails the job; any
/// compensation for partially applied work is the handler's own concern.
#[async_trait]
pub trait WorkHandler: Send + Sync {
    async fn handle_vm_work(
        &self,
        context: &CallContext,
        work: &VmWork,
    ) -> Result<JobOutcome, HandlerError>;
}

/// Handlers keyed by name. Built once at startup and read-only after.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn WorkHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn WorkHandler>> {
        self.handlers.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn WorkHandler>>,
}

impl HandlerRegistryBuilder {
    /// Register `handler` under `name`, replacing any earlier registration.
    pub fn register<H>(self, name: impl Into<String>, handler: H) -> Self
    where
        H: WorkHandler + 'static,
    {
        self.register_arc(name, Arc::new(handler))
    }

    pub fn register_arc(mut self, name: impl Into<String>, handler: Arc<dyn WorkHandler>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}
