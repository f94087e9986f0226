//! The directory client seam

use crate::error::Result;
use crate::records::{GatewayRecord, PeerRecord, RecordKind, SelfRecord, UpsertOutcome};
use async_trait::async_trait;

/// CRUD and list access to mesh records.
///
/// A client is bound to one identity (the local node name): that is the
/// only record it ever writes or deletes.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Name of the record this client owns
    fn identity(&self) -> &str;

    /// All gateway records, in directory order
    async fn gateways(&self) -> Result<Vec<GatewayRecord>>;

    /// All peer records, in directory order
    async fn peers(&self) -> Result<Vec<PeerRecord>>;

    /// Create the self record, or merge its mutable fields into the existing one.
    ///
    /// The record's `name` is ignored; [`DirectoryClient::identity`] is the key.
    async fn upsert_self_record(&self, record: &SelfRecord) -> Result<UpsertOutcome>;

    /// Delete the self record. Returns `false` if there was nothing to delete.
    async fn delete_self_record(&self, kind: RecordKind) -> Result<bool>;
}
