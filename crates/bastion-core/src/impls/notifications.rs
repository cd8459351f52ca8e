use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::{Key, User};
use crate::ports::NotificationSource;

/// Notification counts set by hand; unknown users have none.
#[derive(Debug, Default)]
pub struct FixedNotifications {
    counts: RwLock<HashMap<Key<User>, u32>>,
}

impl FixedNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, user: Key<User>, count: u32) {
        self.counts.write().insert(user, count);
    }
}

impl NotificationSource for FixedNotifications {
    fn unread_count(&self, user: Key<User>) -> u32 {
        self.counts.read().get(&user).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_default_to_zero() {
        let notifications = FixedNotifications::new();
        let alice = Key::from_raw(1);
        assert_eq!(notifications.unread_count(alice), 0);
        notifications.set(alice, 3);
        assert_eq!(notifications.unread_count(alice), 3);
        assert_eq!(notifications.unread_count(Key::from_raw(2)), 0);
    }
}
