pub mod change_event;
pub mod telemetry;

pub use change_event::{ChangeEvent, ChangeOperation};
pub use telemetry::{MobilityStation, MobilityStationsMessage, StationsMetadata, TruckMessage};
