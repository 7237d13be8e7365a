//! Time: the hierarchical wheel, the threads that drive it, and the two
//! wheel users (session timeouts and delayed delivery).

mod driver;
mod monitor;
mod timer;
mod wheel;

pub(crate) use driver::{TickClock, WheelDriver};
pub use monitor::AwaitTimeout;
pub(crate) use monitor::SessionMonitor;
pub(crate) use timer::Timer;
pub use wheel::{TimeWheel, MAX_DELAY};
