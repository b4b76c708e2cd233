mod model_comment;
mod model_notification;
mod model_post;
mod model_quota;
mod model_settings;
mod model_spotlight;
mod model_upvote;
mod model_user;

pub mod scylladb;

pub use model_comment::Comment;
pub use model_notification::{
    Notification, KIND_COMMENT, KIND_FOLLOW, KIND_LIKE, KIND_SPOTLIGHT, KIND_TRENDING, KIND_UPVOTE,
};
pub use model_post::{Post, PostDay, KIND_IMAGE, KIND_TEXT, KIND_THREAD};
pub use model_quota::PostQuota;
pub use model_settings::{UserSettings, AUDIENCE_EVERYONE, AUDIENCE_FOLLOWERS};
pub use model_spotlight::Spotlight;
pub use model_upvote::Upvote;
pub use model_user::User;

pub static MAX_ID: xid::Id = xid::Id([255; 12]);
pub static MIN_ID: xid::Id = xid::Id([0, 0, 0, 0, 255, 255, 255, 255, 255, 255, 255, 255]);

// UTC day number encoded in the id's timestamp prefix
pub fn xid_day(xid: xid::Id) -> i32 {
    let raw = xid.as_bytes();
    let unix_ts = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
    (unix_ts / (3600 * 24)) as i32
}

// the smallest id that can be minted at the given unix second,
// used as a lower bound for time-range scans within a partition
pub fn xid_at(unix_secs: u32) -> xid::Id {
    let ts = unix_secs.to_be_bytes();
    xid::Id([ts[0], ts[1], ts[2], ts[3], 0, 0, 0, 0, 0, 0, 0, 0])
}
