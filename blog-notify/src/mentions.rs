use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::StoreError;
use crate::models::User;
use crate::store::RecordStore;

static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([a-zA-Z0-9_]+)").expect("mention pattern compiles"));

/// Usernames mentioned in `content`, deduplicated in order of first appearance
pub fn extract_mentions(content: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for capture in MENTION.captures_iter(content) {
        let name = &capture[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Usernames mentioned in `current` but not in `previous`
pub fn new_mentions(previous: &str, current: &str) -> Vec<String> {
    let before = extract_mentions(previous);
    extract_mentions(current)
        .into_iter()
        .filter(|name| !before.contains(name))
        .collect()
}

/// Look up each name; unknown names are dropped
pub async fn resolve_mentions(store: &dyn RecordStore, names: &[String]) -> Result<Vec<User>, StoreError> {
    let mut users = Vec::with_capacity(names.len());
    for name in names {
        if let Some(user) = store.find_user_by_name(name).await? {
            users.push(user);
        }
    }
    Ok(users)
}
