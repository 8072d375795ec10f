//! Expansion of input/output templates against data-model tables.
//!
//! Template values are literals, `workspace.<header>` or `this.<path>`. A
//! path walks down through entity-set tables to the entity table at the
//! bottom of the chain. Each set level traversed adds one level of nesting
//! to the result.

mod data_list;
mod reference;

pub use data_list::DataList;
pub use reference::Reference;
