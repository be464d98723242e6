pub mod compile;
pub mod completions;
