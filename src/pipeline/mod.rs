pub mod billing;
pub mod dispatcher;
pub mod ports;
pub mod rate_limiter;
pub mod recorder;
pub mod scheduler;
pub mod worker;
