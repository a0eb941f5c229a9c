use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, bail};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::item::{
    MigrateParams, RebootParams, StartParams, StopParams, TakeVolumeSnapshotParams, VmWork,
    WorkHeader, WorkPayload,
};

/// Turns a raw `cmd_info` payload into a work item.
pub type WorkDecoder = Arc<dyn Fn(&str) -> anyhow::Result<VmWork> + Send + Sync>;

/// A registered work type. A type may be declared without a decoder; such
/// a type resolves but never decodes.
#[derive(Clone)]
pub struct WorkType {
    name: String,
    decoder: Option<WorkDecoder>,
}

impl WorkType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn decode(&self, raw: &str) -> anyhow::Result<VmWork> {
        match &self.decoder {
            Some(decoder) => decoder(raw),
            None => bail!("no decoder registered for work type {}", self.name),
        }
    }
}

impl fmt::Debug for WorkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkType")
            .field("name", &self.name)
            .field("decoder", &self.decoder.as_ref().map(|_| "WorkDecoder"))
            .finish()
    }
}

/// Explicit table from work-type discriminator to decoder. Frozen once
/// built.
#[derive(Debug, Clone, Default)]
pub struct WorkTypeRegistry {
    types: HashMap<String, WorkType>,
}

impl WorkTypeRegistry {
    pub fn builder() -> WorkTypeRegistryBuilder {
        WorkTypeRegistryBuilder::default()
    }

    /// The built-in VM work types.
    pub fn standard() -> Self {
        Self::builder()
            .register_json::<StartParams>(StartParams::WORK_TYPE)
            .register_json::<StopParams>(StopParams::WORK_TYPE)
            .register_json::<RebootParams>(RebootParams::WORK_TYPE)
            .register_json::<MigrateParams>(MigrateParams::WORK_TYPE)
            .register_json::<TakeVolumeSnapshotParams>(TakeVolumeSnapshotParams::WORK_TYPE)
            .build()
    }

    pub fn resolve(&self, cmd: &str) -> Option<&WorkType> {
        self.types.get(cmd)
    }

    /// Registered discriminators, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[derive(Default)]
pub struct WorkTypeRegistryBuilder {
    types: HashMap<String, WorkType>,
}

impl WorkTypeRegistryBuilder {
    /// Register a work type whose payload is the common header plus the
    /// fields of `P`, flattened into one JSON object.
    pub fn register_json<P>(self, name: impl Into<String>) -> Self
    where
        P: DeserializeOwned + Into<WorkPayload> + 'static,
    {
        let decoder: WorkDecoder = Arc::new(decode_json::<P>);
        self.insert(name.into(), Some(decoder))
    }

    pub fn register_with<F>(self, name: impl Into<String>, decoder: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<VmWork> + Send + Sync + 'static,
    {
        self.insert(name.into(), Some(Arc::new(decoder)))
    }

    /// Declare a work type that is known but has no decoder.
    pub fn declare(self, name: impl Into<String>) -> Self {
        self.insert(name.into(), None)
    }

    pub fn build(self) -> WorkTypeRegistry {
        WorkTypeRegistry { types: self.types }
    }

    fn insert(mut self, name: String, decoder: Option<WorkDecoder>) -> Self {
        self.types.insert(name.clone(), WorkType { name, decoder });
        self
    }
}

// The header is read from the whole object; whatever is left must belong
// to `P`, so a payload stored under the wrong type fails instead of losing
// fields.
fn decode_json<P>(raw: &str) -> anyhow::Result<VmWork>
where
    P: DeserializeOwned + Into<WorkPayload>,
{
    let mut fields: Map<String, Value> =
        serde_json::from_str(raw).context("malformed VM work payload")?;
    let header: WorkHeader = serde_json::from_value(Value::Object(fields.clone()))
        .context("malformed VM work payload")?;
    for key in WorkHeader::FIELDS {
        fields.remove(key);
    }
    let params: P =
        serde_json::from_value(Value::Object(fields)).context("malformed VM work payload")?;
    Ok(header.with_payload(params.into()))
}
