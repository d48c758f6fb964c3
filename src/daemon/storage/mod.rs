//!  Storage is split into a local and a remote side.
//!  The basic idea is:
//!   - Usage of a day is one [entities::DailySnapshot].
//!   - Locally every date gets its own json file next to a `meta.json` index
//!     ([snapshot_storage::SnapshotStorageImpl]).
//!   - Remotely all dates live in a single document inside a GitHub Gist
//!     ([remote_storage::RemoteSnapshotStore]).

pub mod entities;
pub mod gist;
pub mod remote_storage;
pub mod snapshot_storage;
