pub mod capture;
pub mod classifier;
pub mod event;
pub mod pipeline;
pub mod record;
