pub mod controller;
pub mod events;
pub mod state;

pub use controller::WalkController;
pub use events::WalkEvent;
pub use state::{WalkSnapshot, WalkState, WalkStatus};
