pub mod clock;
pub mod metrics;
pub mod store;
pub mod writer;

pub use clock::{Clock, FixedClock, SystemClock};
pub use metrics::{get_metrics, init_metrics};
pub use store::{MemoryStore, MongoStore, RecordStore, StoreError};
pub use writer::{
    CreatedReservation, NewAddon, NewPayment, NewReservation, ReservationChanges,
    ReservationDetail, ReservationService,
};
