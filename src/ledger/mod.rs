mod in_memory;
mod log;

pub use in_memory::Ledger;
pub use log::LogEntry;
pub use log::Seq;
