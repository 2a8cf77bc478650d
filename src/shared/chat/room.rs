/**
 * Room Data Structures
 *
 * This module defines the room-side types of the chat core: the room
 * itself, its student/teacher membership, participant roles, and the help
 * mode derived from the room's `help_checked` flag.
 *
 * # Help Mode
 *
 * Every room starts in AI mode (`help_checked = false`). Asking for help
 * flips the room into human mode, where the assigned teacher may speak.
 * Flipping again returns the room to AI mode.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned room identifier
pub type RoomId = i64;

/// External user identifier
pub type UserId = i64;

/// Sender id used for system banners
pub const SYSTEM_SENDER_ID: UserId = 0;

/// Sender id used for AI fragments (shares the system sentinel)
pub const AI_SENDER_ID: UserId = 0;

/// Title used when a room is created without one
pub const DEFAULT_ROOM_TITLE: &str = "새 채팅방";

/// A chat room between one student and one teacher
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    /// Store-assigned id
    pub id: RoomId,
    /// Display title, denormalized into every message
    pub title: String,
    /// `false` = AI mode, `true` = human-teacher mode
    pub help_checked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    /// Current routing mode of the room
    pub fn mode(&self) -> HelpMode {
        HelpMode::from_help_checked(self.help_checked)
    }
}

/// The student/teacher pairing that owns a room
///
/// Membership is fixed when the room is created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Membership {
    pub room_id: RoomId,
    pub student_id: UserId,
    pub teacher_id: UserId,
}

impl Membership {
    /// Role of `user_id` inside this room, if they are a member
    pub fn role_of(&self, user_id: UserId) -> Option<Role> {
        if user_id == self.student_id {
            Some(Role::Student)
        } else if user_id == self.teacher_id {
            Some(Role::Teacher)
        } else {
            None
        }
    }
}

/// Role of a human participant, as reported by the user directory
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    /// Convert to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
        }
    }

    /// Parse from a database value
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Role::Student),
            "teacher" => Some(Role::Teacher),
            _ => None,
        }
    }
}

/// Routing mode of a room
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HelpMode {
    /// Student talks to the AI assistant
    Ai,
    /// Student talks to the assigned teacher
    Human,
}

impl HelpMode {
    pub fn from_help_checked(help_checked: bool) -> Self {
        if help_checked {
            HelpMode::Human
        } else {
            HelpMode::Ai
        }
    }

    /// Banners emitted when a room enters this mode, in order
    pub fn entry_banners(&self) -> [SystemBanner; 2] {
        match self {
            HelpMode::Human => [SystemBanner::AiGoodbye, SystemBanner::TeacherWelcome],
            HelpMode::Ai => [SystemBanner::TeacherGoodbye, SystemBanner::AiWelcome],
        }
    }
}

/// Fixed system messages emitted on help mode transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemBanner {
    AiWelcome,
    AiGoodbye,
    TeacherWelcome,
    TeacherGoodbye,
}

impl SystemBanner {
    pub fn text(&self) -> &'static str {
        match self {
            SystemBanner::AiWelcome => "AI 선생님과의 대화가 시작되었습니다. 궁금한 점을 물어보세요!",
            SystemBanner::AiGoodbye => "AI 선생님과의 대화가 종료되었습니다.",
            SystemBanner::TeacherWelcome => "선생님과의 대화가 시작됩니다.",
            SystemBanner::TeacherGoodbye => "선생님과의 대화가 종료되었습니다.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_role_of() {
        let membership = Membership { room_id: 1, student_id: 10, teacher_id: 20 };
        assert_eq!(membership.role_of(10), Some(Role::Student));
        assert_eq!(membership.role_of(20), Some(Role::Teacher));
        assert_eq!(membership.role_of(30), None);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("student"), Some(Role::Student));
        assert_eq!(Role::parse(" TEACHER "), Some(Role::Teacher));
        assert_eq!(Role::parse("admin"), None);
    }

    #[test]
    fn test_entry_banners_order() {
        assert_eq!(
            HelpMode::Human.entry_banners(),
            [SystemBanner::AiGoodbye, SystemBanner::TeacherWelcome]
        );
        assert_eq!(
            HelpMode::Ai.entry_banners(),
            [SystemBanner::TeacherGoodbye, SystemBanner::AiWelcome]
        );
    }
}
