pub mod error;
pub mod params;
pub mod dataset;
pub mod partition;
pub mod worker;
pub mod pool;
pub mod pipeline;
pub mod services;
