//! SQL text handling: parameter binding, query validation and the wrappers
//! used to probe and partition user queries.

pub mod bind;
pub mod builder;
pub mod parser;

pub use bind::{bind, bind_with, BindOptions};
pub use parser::UserQuery;
