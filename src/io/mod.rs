pub mod psl;
pub mod query;

pub use psl::PslWriter;
pub use query::{Query, QueryReader};
