//! Session: combines the identity feed and the profile document into one
//! consistent, reactive view.

mod driver;
mod machine;
mod view;

pub use driver::{Session, resolve_once};
pub use machine::{Directive, SessionMachine, SessionPhase, SessionState};
pub use view::SessionView;
