mod bookmark;
mod device;
mod object_id;

pub use bookmark::{Bookmark, NewBookmark};
pub use device::{Device, NewDevice};
pub use object_id::{DeviceId, IdError, ObjectId};
