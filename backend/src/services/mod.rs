pub mod capture;
pub mod describe;
pub mod gate;
pub mod reconciler;
pub mod schema;
pub mod sweeper;
