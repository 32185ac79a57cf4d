//! Query specifications and their declarative form.
//!
//! - [`QuerySpec`] - one immutable query with its derived smart SQL
//! - [`QuerySpecParser`] - JSON to spec, with host-registered custom kinds

mod parser;
mod spec;

pub use parser::{QuerySpecFactory, QuerySpecParser};
pub use spec::{qualify_match_key, Order, QuerySpec, QuerySpecBuilder, QueryType, DEFAULT_PAGE_SIZE};
