//! The HTTP admin/debug surface is out of scope for re-implementation:
//! this module only pins down the interface a future HTTP layer must
//! expose, so the rest of the crate has a stable seam to call into.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("admin operation not implemented: {0}")]
    NotImplemented(&'static str),
}

/// One route per admin endpoint. A future HTTP front end dispatches
/// onto this trait; nothing here speaks HTTP.
#[async_trait]
pub trait AdminSurface: Send + Sync {
    async fn status(&self) -> Result<String, Error> {
        Err(Error::NotImplemented("/"))
    }

    async fn stats(&self) -> Result<String, Error> {
        Err(Error::NotImplemented("/stats"))
    }

    async fn memory(&self) -> Result<String, Error> {
        Err(Error::NotImplemented("/memory"))
    }

    async fn storage(&self) -> Result<String, Error> {
        Err(Error::NotImplemented("/storage"))
    }

    async fn config(&self) -> Result<String, Error> {
        Err(Error::NotImplemented("/config"))
    }

    async fn clear_cache(&self) -> Result<(), Error> {
        Err(Error::NotImplemented("/clearcache"))
    }

    async fn rotate_log(&self) -> Result<(), Error> {
        Err(Error::NotImplemented("/rotatelog"))
    }

    /// Non-blocking: issues `WriteSnapshotTOC` (freezes deletions, writes
    /// a TOC referencing all current chunks + config state) and returns
    /// the new snapshot's ID.
    async fn start_backup(&self) -> Result<u64, Error> {
        Err(Error::NotImplemented("/startbackup"))
    }

    async fn end_backup(&self, _toc_id: u64) -> Result<(), Error> {
        Err(Error::NotImplemented("/endbackup"))
    }

    async fn settings(&self, _query: &str) -> Result<String, Error> {
        Err(Error::NotImplemented("/settings"))
    }
}
