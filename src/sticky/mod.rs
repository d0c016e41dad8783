//! The sticky-session core: token derivation, resolution, selection and
//! the cookie boundary.

mod cookie;
mod digest;
mod resolver;
mod selector;

pub use cookie::StickyCookie;
pub use resolver::MatchPolicy;
pub use selector::{SelectionContext, StickySelector};
