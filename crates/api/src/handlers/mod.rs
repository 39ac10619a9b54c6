pub mod health;
pub mod jobs;
pub mod stats;
pub mod workers;
