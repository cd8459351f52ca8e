//! NotificationSource port: unread notification counts shown in sessions.

use crate::domain::{Key, User};

pub trait NotificationSource: Send + Sync {
    fn unread_count(&self, user: Key<User>) -> u32;
}
