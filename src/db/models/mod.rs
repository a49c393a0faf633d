mod session;
mod trace_point;

pub use session::Session;
pub use trace_point::{Phase, TracePoint};
