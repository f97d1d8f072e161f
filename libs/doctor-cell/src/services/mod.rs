pub mod doctor;
pub mod schedule;
pub mod slots;

pub use doctor::DoctorService;
pub use slots::SlotService;
