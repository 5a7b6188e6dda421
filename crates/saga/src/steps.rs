//! Booking saga step names.
//!
//! Forward steps run in declaration order; compensation steps undo the
//! resources acquired by the forward steps, newest first.

/// The saga type identifier recorded in the saga log.
pub const SAGA_TYPE: &str = "CreateBooking";

pub const STEP_ACQUIRE_LOCK: &str = "acquire_lock";
pub const STEP_VALIDATE_SLOT: &str = "validate_slot";
pub const STEP_PRICE_SERVICES: &str = "price_services";
pub const STEP_RECORD_BOOKING: &str = "record_booking";
pub const STEP_FINALIZE_SLOT: &str = "finalize_slot";
pub const STEP_CONFIRM_BOOKING: &str = "confirm_booking";

pub const COMPENSATE_RELEASE_SLOT: &str = "release_slot";
pub const COMPENSATE_CANCEL_BOOKING: &str = "cancel_booking";
pub const COMPENSATE_RELEASE_LOCK: &str = "release_lock";
