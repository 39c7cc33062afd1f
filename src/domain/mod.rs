pub mod assistant;
pub mod models;
pub mod session;
pub mod settings;
