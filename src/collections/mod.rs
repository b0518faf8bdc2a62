//! Lock-guarded collections
//!
//! A list and a map, each owning one read/write lock strategy selected at
//! construction. Every read takes the read lock for its duration, every
//! mutation takes the write lock; removal completions run only after the
//! lock has been released.

mod list;
mod map;

pub use list::SafeList;
pub use map::SafeMap;
