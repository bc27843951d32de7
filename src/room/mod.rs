// Public API
pub use handlers::{
    close_room, create_room, health, join_room, leave_room, ready_participant, room_status,
};
pub use models::{Participant, Room, RoomStats, RoomStatus};
pub use store::{CloseRoomResult, InMemoryRoomStore, RoomStore};
pub use sweep_task::start_sweep_task;

// Internal modules
mod handlers;
pub mod models;
pub mod store;
mod sweep_task;
pub mod types;
