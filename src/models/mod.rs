pub mod audit;
pub mod channel;
pub mod evolution;
pub mod health;
pub mod lead;
pub mod message;
pub mod phone;
pub mod retry;
pub mod status;
pub mod trigger;
