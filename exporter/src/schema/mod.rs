mod cache;
mod column;
mod descriptor;

pub use cache::*;
pub use column::*;
pub use descriptor::*;
