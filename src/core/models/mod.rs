pub mod aggregate;
pub mod ccusage;
pub mod usage;
