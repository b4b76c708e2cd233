mod columns;
mod value;

pub use columns::ColumnsMap;
pub use value::{CqlValue, FromCqlVal, FromCqlValError, ToCqlVal};
