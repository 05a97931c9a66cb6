mod document;
mod extracted;
mod name;
mod row;

pub use document::*;
pub use extracted::*;
pub use name::*;
pub use row::*;
