pub mod health;
pub mod keepalive;
pub mod lease;
pub mod metrics;
