pub mod authorization;
pub mod booking;
pub mod lifecycle;

pub use authorization::{resolve_actor_role, ActorRole};
pub use booking::AppointmentBookingService;
pub use lifecycle::AppointmentLifecycleService;
