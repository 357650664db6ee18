pub mod model;
pub mod serve;
