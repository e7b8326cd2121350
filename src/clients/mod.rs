pub mod database;
pub mod evolution;
pub mod health;
pub mod rbmq;
