pub mod deps;
pub mod humanize;
pub mod logger;

pub use deps::DependencyStatus;
pub use humanize::{format_duration, format_file_size, format_rate};
pub use logger::init_logging;
