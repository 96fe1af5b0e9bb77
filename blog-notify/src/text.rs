//! Excerpts and links embedded in notification emails

use crate::models::{CommentId, PostId};

/// Excerpt length for comment and like bodies
pub const SHORT_EXCERPT: usize = 100;

/// Excerpt length for published posts
pub const LONG_EXCERPT: usize = 150;

const ELLIPSIS: &str = "...";

/// Shorten `text` to at most `max_chars` characters.
///
/// Text that already fits is returned unchanged. Otherwise the first
/// `max_chars - 3` characters are kept and `"..."` appended. Counts are in
/// chars, so multi-byte text is never split mid-character. Limits below the
/// ellipsis width cut without one.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars < ELLIPSIS.len() {
        return text.chars().take(max_chars).collect();
    }

    let mut out: String = text.chars().take(max_chars - ELLIPSIS.len()).collect();
    out.push_str(ELLIPSIS);
    out
}

pub fn post_path(post_id: PostId) -> String {
    format!("/posts/{}", post_id)
}

/// Post link anchored at a comment
pub fn comment_path(post_id: PostId, comment_id: CommentId) -> String {
    format!("/posts/{}#comment-{}", post_id, comment_id)
}
