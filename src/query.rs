//! Query Materialization
//!
//! # Components
//!
//! - [`Macros`]: Named runtime values and relative date expressions
//! - [`Overrides`]: Caller replacements for customizable query parts
//! - [`Materializer`]: Binds a definition into a [`MaterializedQuery`]

mod macros;
mod materializer;

pub use macros::{DateRange, END_DATE, MacroError, Macros, START_DATE, convert_date};
pub use materializer::{
    MaterializeError, MaterializedQuery, Materializer, N_DAYS_ALIAS, Overrides,
};
