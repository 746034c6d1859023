pub mod id;
pub mod role;

pub use id::{generate_id, PeerId, RoomId};
pub use role::{Role, TransportDirection};
