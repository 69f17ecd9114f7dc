//! 用户实体
//!
//! 用户记录由外部身份系统拥有，这里只消费 id、用户名和好友集合。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::value_objects::{UserId, Username};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub friends: HashSet<UserId>,
}

impl User {
    pub fn new(id: UserId, username: Username) -> Self {
        Self {
            id,
            username,
            friends: HashSet::new(),
        }
    }

    pub fn is_friends_with(&self, other: UserId) -> bool {
        self.friends.contains(&other)
    }

    /// 集合语义的幂等添加。返回是否发生了实际变化。
    pub fn add_friend(&mut self, other: UserId) -> bool {
        self.friends.insert(other)
    }
}
