pub mod channels;
pub mod lifetime;

pub use channels::{FeedbackNotice, NoticeChannel};
pub use lifetime::ViewLifetime;
