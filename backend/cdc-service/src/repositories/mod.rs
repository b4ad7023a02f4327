pub mod events;
pub mod telemetry;
pub mod tickets;

pub use events::{CascadeGuard, CascadeUpdate, CatalogReader, EventCatalog, PgCatalog};
pub use telemetry::{
    MobilityStationRepository, MobilityStationSink, TruckPositionSink, TruckRepository,
};
pub use tickets::{PgTicketDirectory, TicketDirectory, TicketHolder};
