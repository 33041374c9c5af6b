//! dlcount-counter — per-day download counts.
//!
//! Each day has one hash record (`download-YYYY-MM-DD`). Its fields are
//! package names; each field holds a JSON object mapping version to count:
//!
//! ```text
//! HGET download-2024-03-01 @scope/pkg  →  {"1.2.3":41,"1.2.4":7}
//! ```
//!
//! [`record::merge_download`] is the pure merge step, [`record::increment`]
//! runs it against one connection, and [`DownloadCounter`] ties parser,
//! pool and day key together behind a boundary that never fails.

pub mod counter;
pub mod error;
pub mod record;

pub use counter::{Counted, DownloadCounter};
pub use error::{CountError, CountResult};
pub use record::{increment, merge_download};
