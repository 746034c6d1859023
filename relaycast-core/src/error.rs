use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Capacity exhausted: {0}")]
    Capacity(String),

    #[error("No such room: {0}")]
    NoRoom(String),

    #[error("Room is full: {0}")]
    RoomFull(String),

    #[error("Room already has a host: {0}")]
    HostPresent(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Role mismatch: {0}")]
    RoleMismatch(String),

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Transport not ready: {0}")]
    TransportNotReady(String),

    #[error("Already consuming: {0}")]
    AlreadyConsuming(String),

    #[error("Producer not consumable: {0}")]
    NotConsumable(String),

    #[error("Media worker error: {0}")]
    MediaWorker(String),

    #[error("Fatal: {0}")]
    Fatal(String),
}

impl Error {
    /// Machine-readable code carried in `error` frames and HTTP bodies.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::Capacity(_) => "CAPACITY",
            Self::NoRoom(_) => "NO_ROOM",
            Self::RoomFull(_) => "ROOM_FULL",
            Self::HostPresent(_) => "HOST_PRESENT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::RoleMismatch(_) => "ROLE_MISMATCH",
            Self::State(_) => "STATE_ERROR",
            Self::TransportNotReady(_) => "TRANSPORT_NOT_READY",
            Self::AlreadyConsuming(_) => "ALREADY_CONSUMING",
            Self::NotConsumable(_) | Self::MediaWorker(_) => "MEDIA_WORKER",
            Self::Fatal(_) => "FATAL",
        }
    }

    /// Whether a signaling session that hit this error must be closed.
    ///
    /// Protocol-level errors produce an `error` frame and the session
    /// keeps running; media-worker failures during produce/consume and
    /// fatal conditions tear the session down with close code 1011.
    #[must_use]
    pub const fn is_session_fatal(&self) -> bool {
        matches!(self, Self::MediaWorker(_) | Self::Fatal(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
