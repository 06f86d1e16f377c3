use serde::{Deserialize, Serialize};

/// One feed entry eligible for navigation.
///
/// Field names follow the forum's `topic_list.topics` wire shape so the same
/// struct decodes feed pages and the persisted queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,

    #[serde(rename = "posts_count")]
    pub post_count: u32,

    #[serde(
        rename = "last_read_post_number",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_read_position: Option<u32>,
}

impl Item {
    pub fn new(id: u64, post_count: u32) -> Self {
        Self {
            id,
            post_count,
            last_read_position: None,
        }
    }

    pub fn with_last_read(mut self, position: u32) -> Self {
        self.last_read_position = Some(position);
        self
    }

    /// Path of the topic page, resuming at the last read post when known
    pub fn path(&self) -> String {
        match self.last_read_position {
            Some(position) => format!("/t/topic/{}/{}", self.id, position),
            None => format!("/t/topic/{}", self.id),
        }
    }

    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.path())
    }
}

/// Everything the reader persists between page loads and restarts.
///
/// Owned by [`SessionManager`](crate::state::SessionManager); every mutation
/// goes through it so the persisted copy never lags behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub reading_enabled: bool,
    pub liking_enabled: bool,
    pub reaction_count: u32,
    pub pending_queue: Vec<Item>,
}

impl SessionState {
    pub fn cap_reached(&self, cap: u32) -> bool {
        self.reaction_count >= cap
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_url_without_position() {
        let item = Item::new(42, 10);
        assert_eq!(item.url("https://linux.do"), "https://linux.do/t/topic/42");
    }

    #[test]
    fn test_item_url_resumes_last_read() {
        let item = Item::new(42, 10).with_last_read(7);
        assert_eq!(item.url("https://linux.do/"), "https://linux.do/t/topic/42/7");
    }

    #[test]
    fn test_item_decodes_wire_shape() {
        let json = r#"{"id": 5, "posts_count": 12, "last_read_post_number": 3, "title": "x"}"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item, Item::new(5, 12).with_last_read(3));

        let json = r#"{"id": 6, "posts_count": 1}"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.last_read_position, None);
    }

    #[test]
    fn test_cap_reached() {
        let state = SessionState {
            reaction_count: 50,
            ..Default::default()
        };
        assert!(state.cap_reached(50));
        assert!(!state.cap_reached(51));
    }
}
