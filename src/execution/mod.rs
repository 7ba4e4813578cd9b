pub mod unfollow;

pub use unfollow::{SweepSummary, UnfollowDriver};
