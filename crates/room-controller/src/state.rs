//! Pure per-room state: membership, host authority, buffer flags, playlist.
//!
//! This module has no I/O and no clocks; the `RoomActor` drives it and owns
//! all side effects. Invariants maintained here:
//!
//! - `host_id` is a member whenever the room is non-empty (after promotion)
//! - buffer flags exist exactly for current members
//! - `0 <= current_index < playlist.len()` whenever the playlist is non-empty,
//!   otherwise `current_index == 0`

use serde::{Deserialize, Serialize};

/// An immutable playlist entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItem {
    /// Generated id: `{unix_millis}-{uuid prefix}`.
    pub id: String,
    /// Validated media URL.
    pub url: String,
    /// Display title.
    pub title: String,
    /// Display name of the member who added it.
    pub added_by: String,
}

/// Roster entry for `presence` broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub id: String,
    pub name: String,
    pub is_host: bool,
}

/// A member's mutable per-room record.
#[derive(Debug, Clone)]
struct Member {
    connection_id: String,
    display_name: String,
    /// True when the member reports enough media buffered to play.
    buffered: bool,
}

/// State owned by a single room.
#[derive(Debug)]
pub struct RoomState {
    host_id: String,
    /// Insertion-ordered: host promotion picks the first remaining member.
    members: Vec<Member>,
    playlist: Vec<PlaylistItem>,
    current_index: usize,
}

impl RoomState {
    /// Create an empty room. The first member added becomes host via
    /// [`RoomState::set_host`] in the actor's join path.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host_id: String::new(),
            members: Vec::new(),
            playlist: Vec::new(),
            current_index: 0,
        }
    }

    /// Add a member with their buffer flag initialized to true. Updates the
    /// display name if the connection is already a member.
    pub fn add_member(&mut self, connection_id: &str, display_name: &str) {
        if let Some(member) = self.member_mut(connection_id) {
            member.display_name = display_name.to_string();
            return;
        }
        self.members.push(Member {
            connection_id: connection_id.to_string(),
            display_name: display_name.to_string(),
            buffered: true,
        });
    }

    /// Remove a member and their buffer flag. Returns false if absent.
    pub fn remove_member(&mut self, connection_id: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.connection_id != connection_id);
        self.members.len() != before
    }

    #[must_use]
    pub fn contains(&self, connection_id: &str) -> bool {
        self.members.iter().any(|m| m.connection_id == connection_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn set_host(&mut self, connection_id: &str) {
        self.host_id = connection_id.to_string();
    }

    #[must_use]
    pub fn is_host(&self, connection_id: &str) -> bool {
        !self.host_id.is_empty() && self.host_id == connection_id
    }

    /// Whether the recorded host is currently a member.
    #[must_use]
    pub fn host_present(&self) -> bool {
        self.contains(&self.host_id)
    }

    /// First remaining member in join order, if any.
    #[must_use]
    pub fn first_member(&self) -> Option<&str> {
        self.members.first().map(|m| m.connection_id.as_str())
    }

    /// Member connection ids in join order.
    #[must_use]
    pub fn member_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.connection_id.clone()).collect()
    }

    #[must_use]
    pub fn display_name(&self, connection_id: &str) -> Option<&str> {
        self.members
            .iter()
            .find(|m| m.connection_id == connection_id)
            .map(|m| m.display_name.as_str())
    }

    /// Roster snapshot for `presence` broadcasts.
    #[must_use]
    pub fn presence(&self) -> Vec<PresenceEntry> {
        self.members
            .iter()
            .map(|m| PresenceEntry {
                id: m.connection_id.clone(),
                name: m.display_name.clone(),
                is_host: self.host_id == m.connection_id,
            })
            .collect()
    }

    fn member_mut(&mut self, connection_id: &str) -> Option<&mut Member> {
        self.members
            .iter_mut()
            .find(|m| m.connection_id == connection_id)
    }

    /// Record a member's buffer flag. Non-members are ignored.
    pub fn set_buffered(&mut self, connection_id: &str, buffered: bool) {
        if let Some(member) = self.member_mut(connection_id) {
            member.buffered = buffered;
        }
    }

    /// Force every member's buffer flag to true.
    pub fn force_all_buffered(&mut self) {
        for member in &mut self.members {
            member.buffered = true;
        }
    }

    /// Aggregate buffer gate: AND over all member flags, vacuously true.
    #[must_use]
    pub fn all_buffered(&self) -> bool {
        self.members.iter().all(|m| m.buffered)
    }

    /// Append a playlist item with a generated id. Returns a clone of it.
    pub fn add_playlist_item(&mut self, url: String, title: String, added_by: String) -> PlaylistItem {
        let id = format!(
            "{}-{}",
            chrono::Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4().simple().to_string().get(..9).unwrap_or("000000000")
        );
        let item = PlaylistItem {
            id,
            url,
            title,
            added_by,
        };
        self.playlist.push(item.clone());
        item
    }

    /// Remove a playlist item by id, maintaining the current index:
    /// removing before the current item shifts the index down; removing the
    /// current item past the new end clamps to the last item (or 0 when the
    /// playlist empties). Returns false when the id is unknown.
    pub fn remove_playlist_item(&mut self, item_id: &str) -> bool {
        let Some(index) = self.playlist.iter().position(|item| item.id == item_id) else {
            return false;
        };
        self.playlist.remove(index);

        if index < self.current_index {
            self.current_index -= 1;
        } else if index == self.current_index && self.current_index >= self.playlist.len() {
            self.current_index = self.playlist.len().saturating_sub(1);
        }
        true
    }

    /// Select a playlist item by index. Out-of-bounds selections are
    /// rejected. Returns the newly current item.
    pub fn select_playlist_index(&mut self, index: usize) -> Option<&PlaylistItem> {
        let item = self.playlist.get(index)?;
        self.current_index = index;
        Some(item)
    }

    #[must_use]
    pub fn playlist(&self) -> &[PlaylistItem] {
        &self.playlist
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }
}

impl Default for RoomState {
    fn default() -> Self {
        Self::new()
    }
}
