pub mod bluetooth;
pub mod history;
pub mod logging;
pub mod pipeline;
