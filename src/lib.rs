pub mod academic;
pub mod attendance;
pub mod calendar;
pub mod config;
pub mod db;
pub mod error;
#[cfg(test)]
mod memory;
pub mod models;
pub mod ranking;
pub mod recalc;
pub mod report;
pub mod score;
pub mod source;
pub mod survey;
pub mod telemetry;
pub mod test_return;
