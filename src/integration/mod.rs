//! Wiring of the feedback components for one hosting view

pub mod config;
pub mod view;

pub use config::FeedbackConfig;
pub use view::{FeedbackView, FeedbackViewBuilder};
