pub mod parse;

pub use parse::{ParseArgs, handle_parse};
