pub mod handle;
pub mod pacing;
pub mod poll;
pub mod progress;
pub mod reconcile;

pub use handle::Handle;
pub use progress::ProgressLedger;
pub use reconcile::reconcile;
