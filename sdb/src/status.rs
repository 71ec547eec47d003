//! Status/error code space.
//!
//! This is the terminal classification attached to each entry in a
//! client [`crate::routing::Result`], and the outcome every timeout or
//! transport failure eventually degrades into.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    ApiError,
    Partial,
    Failure,
    NoMaster,
    NoConnection,
    NoPrimary,
    MasterTimeout,
    GlobalTimeout,
    PrimaryTimeout,
    NoService,
    Failed,
    BadSchema,
}

impl Status {
    /// True for statuses that mean "try again won't help without a
    /// topology change or elapsed time", i.e. the request is done.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::NoService | Status::Partial)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Success => "SUCCESS",
            Status::ApiError => "API_ERROR",
            Status::Partial => "PARTIAL",
            Status::Failure => "FAILURE",
            Status::NoMaster => "NOMASTER",
            Status::NoConnection => "NOCONNECTION",
            Status::NoPrimary => "NOPRIMARY",
            Status::MasterTimeout => "MASTER_TIMEOUT",
            Status::GlobalTimeout => "GLOBAL_TIMEOUT",
            Status::PrimaryTimeout => "PRIMARY_TIMEOUT",
            Status::NoService => "NOSERVICE",
            Status::Failed => "FAILED",
            Status::BadSchema => "BADSCHEMA",
        };
        f.write_str(s)
    }
}
