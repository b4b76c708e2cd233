pub mod context;
pub mod encoding;
pub mod erring;
pub mod object;
