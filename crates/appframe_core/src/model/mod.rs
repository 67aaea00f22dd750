//! Observable records and their supporting types.
//!
//! # Responsibility
//! - Declare record types ([`schema`]) and hold record state ([`record`]).
//! - Describe attribute changes and record signals ([`change`]).
//! - Provide the option bag, response parsing and string transforms shared
//!   by records and collections.
//!
//! # Invariants
//! - A record is always reachable through the `Record` handle only; clones
//!   share state.

pub mod change;
pub mod escape;
pub mod options;
pub mod parse;
pub mod record;
pub mod schema;
