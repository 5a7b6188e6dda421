//! Shared types for the booking system.

pub mod clock;
pub mod identity;
pub mod money;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::{Identity, ParseRoleError, Role};
pub use money::{Money, ParseMoneyError};
pub use types::{BookingId, SagaId, SalonId, ServiceId, SlotId, StaffId, UserId};
