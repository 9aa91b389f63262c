pub mod addon;
pub mod counter;
pub mod payment;
pub mod reservation;

pub use addon::Addon;
pub use counter::SequenceCounter;
pub use payment::{Payment, PaymentKind};
pub use reservation::{Reservation, ReservationPatch};
