#![forbid(unsafe_code)]

//! Core: identity keys, time sources, cancellation, and the observable value
//! primitive that every rnotify container broadcasts through.

pub mod clock;
pub mod cx;
pub mod error;
pub mod key;
pub mod observable;

pub use clock::{Clock, LabClock};
pub use cx::{Cx, CxController, CxError};
pub use error::{BoxError, NotifierError, RelatedIssue, Result};
pub use key::{Key, ReferenceId};
pub use observable::{ObservableValue, Subscription};
