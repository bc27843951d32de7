// Public API
pub use handler::websocket_handler;
pub use hub::{compute_assignments, Binding, MapBlueprints, NoMapBlueprints, SessionHub};
pub use messages::{ClientMessage, ClientRole, ServerMessage, SlotAssignment};

// Internal modules
mod handler;
pub mod hub;
pub mod messages;
