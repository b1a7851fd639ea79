#![forbid(unsafe_code)]

pub mod error;
pub mod integrity;
pub mod ledger;
pub mod model;
pub mod randomizer;
pub mod scoring;
pub mod time;
pub mod timer;

pub use error::Error;
pub use time::Clock;
