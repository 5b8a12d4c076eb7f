use thiserror::Error;

/// Rejections and failures raised by the booking ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Exit time must be after entry time")]
    InvalidWindow,

    #[error("Date must fall between years 1000 and 9999")]
    DateOutOfRange,

    #[error("Unknown parking slot: {0}")]
    UnknownSlot(String),

    #[error("Register a vehicle number before booking a slot")]
    VehicleRequired,

    #[error("Slot {slot} is occupied during this time range")]
    SlotOccupied { slot: String },

    #[error("You already have a booking that overlaps this time range")]
    OverlappingBooking,

    #[error("Reservation not found")]
    ReservationNotFound,

    #[error("Reservation belongs to another account")]
    NotOwner,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl LedgerError {
    /// True for rejections caused by an existing booking.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::SlotOccupied { .. } | Self::OverlappingBooking)
    }
}
