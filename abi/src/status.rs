//! Status codes returned by blocking operations.
//!
//! Ordinary outcomes only: unavailability and timeouts are delivered to the
//! (formerly) blocked caller on resumption as one of these values.
//! Internal-consistency violations never appear here — they go through
//! [`crate::fatal::FatalCode`] and do not return.

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Status {
    /// The operation completed as requested.
    #[default]
    Successful = 0,
    /// The resource was unavailable and the caller declined to wait.
    Unsatisfied = 1,
    /// The caller waited and the timeout expired first.
    Timeout = 2,
    /// The object was deleted while the caller was waiting on it.
    ObjectWasDeleted = 3,
    /// The identifier does not name a live object.
    InvalidId = 4,
    /// A fixed-capacity table is exhausted.
    TooMany = 5,
    /// A buffer or payload size is out of range for the object.
    InvalidSize = 6,
    /// A priority argument is outside the configured range.
    InvalidPriority = 7,
}

impl Status {
    #[inline]
    pub const fn is_successful(self) -> bool {
        matches!(self, Self::Successful)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Successful => "successful",
            Self::Unsatisfied => "unsatisfied",
            Self::Timeout => "timeout",
            Self::ObjectWasDeleted => "object was deleted",
            Self::InvalidId => "invalid id",
            Self::TooMany => "too many",
            Self::InvalidSize => "invalid size",
            Self::InvalidPriority => "invalid priority",
        }
    }
}
