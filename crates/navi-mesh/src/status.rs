//! Status codes for navigation mesh operations

use navi_common::Error;

/// Status enum for navigation mesh operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Operation failed due to an unknown reason
    Failure,
    /// Provided parameter was invalid
    InvalidParam,
    /// A polygon reference does not resolve to a live polygon
    InvalidPolyRef,
    /// The node pool ran out of nodes during a search
    OutOfNodes,
    /// Result did not fit the provided capacity
    BufferTooSmall,
    /// Operation partially succeeded
    PartialResult,
    /// Tile slot or grid location is already occupied
    AlreadyExists,
    /// Tile index lies outside the mesh's tile capacity
    TileOutOfBounds,
    /// Input data is corrupted or invalid
    DataCorrupted,
    /// File has wrong magic number
    WrongMagic,
    /// File has wrong version
    WrongVersion,
}

impl Status {
    /// Whether this status describes a problem with asset data
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Status::DataCorrupted
                | Status::WrongMagic
                | Status::WrongVersion
                | Status::AlreadyExists
                | Status::TileOutOfBounds
        )
    }
}

impl std::error::Error for Status {}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Failure => write!(f, "Failure"),
            Status::InvalidParam => write!(f, "Invalid parameter"),
            Status::InvalidPolyRef => write!(f, "Invalid polygon reference"),
            Status::OutOfNodes => write!(f, "Out of nodes"),
            Status::BufferTooSmall => write!(f, "Buffer too small"),
            Status::PartialResult => write!(f, "Partial result"),
            Status::AlreadyExists => write!(f, "Value already exists"),
            Status::TileOutOfBounds => write!(f, "Tile out of bounds"),
            Status::DataCorrupted => write!(f, "Data corrupted"),
            Status::WrongMagic => write!(f, "Wrong magic number"),
            Status::WrongVersion => write!(f, "Wrong version"),
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        if status.is_data_error() {
            Error::MalformedAsset(status.to_string())
        } else {
            Error::Detour(status.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_maps_to_error_kind() {
        assert!(matches!(
            Error::from(Status::WrongMagic),
            Error::MalformedAsset(_)
        ));
        assert!(matches!(
            Error::from(Status::InvalidPolyRef),
            Error::Detour(_)
        ));
    }
}
