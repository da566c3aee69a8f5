use async_trait::async_trait;

use crate::record::Record;

/// A projection stage: receives a record and returns the (possibly updated)
/// record that continues down the pipeline.
///
/// Returning an error halts the whole stream.
#[async_trait]
pub trait Transform: Send + Sync {
    async fn apply(&self, record: Record) -> anyhow::Result<Record>;

    fn name(&self) -> &str {
        "map"
    }
}

/// A gate stage: records for which `test` is false are dropped from the rest
/// of the pipeline without failing the stream.
pub trait Predicate: Send + Sync {
    fn test(&self, record: &Record) -> bool;

    fn name(&self) -> &str {
        "filter"
    }
}

/// A side-effecting stage: observes the record and lets it pass unchanged.
///
/// Returning an error halts the whole stream.
#[async_trait]
pub trait Effect: Send + Sync {
    async fn apply(&self, record: &Record) -> anyhow::Result<()>;

    fn name(&self) -> &str {
        "each"
    }
}
