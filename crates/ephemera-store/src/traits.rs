//! Store trait definitions

use ephemera_config::EnvironmentRecord;

use crate::StoreResult;

/// Load/save access to the project's environment record.
///
/// Whole-record semantics: `save` replaces everything on disk, so across
/// processes the last writer wins.
pub trait ConfigStore: Send + Sync {
    /// Load the record, or the default record if none was ever saved
    fn load(&self) -> StoreResult<EnvironmentRecord>;

    /// Persist the record
    fn save(&self, record: &EnvironmentRecord) -> StoreResult<()>;

    /// Where the record lives, for log and status output
    fn describe(&self) -> String;
}
