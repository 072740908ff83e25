//! Message fan-out, presence propagation, and history paging.

pub mod fanout;
pub mod history;
pub mod presence;
