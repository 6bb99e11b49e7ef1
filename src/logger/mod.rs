pub mod task;
pub mod trend;

pub use task::{DrainControl, DrainTask, SessionGuard, SessionRegistry};
pub use trend::{LogRow, LoggerState, TrendLogger};
