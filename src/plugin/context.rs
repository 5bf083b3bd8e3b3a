use super::{ContextPlugin, Plugin};
use crate::data::Video;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Names files `<channel>-<YYYYMMDDHHmm>[-<game>]`.
///
/// Lowest priority of the built-ins so any specific plugin overrides it.
pub struct GenericPlugin;

impl Plugin for GenericPlugin {
    fn name(&self) -> &str {
        "generic"
    }

    fn priority(&self) -> i32 {
        -10
    }
}

#[async_trait]
impl ContextPlugin for GenericPlugin {
    async fn suggest_filename(&self, video: &Video) -> Option<String> {
        let mut parts = Vec::new();

        let user = slugify(&video.channel.name, false);
        if !user.is_empty() {
            parts.push(user);
        }
        // Recording time in UTC so the name does not depend on the host
        if let Ok(recorded) = DateTime::parse_from_rfc3339(&video.recorded_at) {
            parts.push(
                recorded
                    .with_timezone(&Utc)
                    .format("%Y%m%d%H%M")
                    .to_string(),
            );
        }
        if let Some(game) = video.game.as_deref() {
            let game = slugify(game, true);
            if !game.is_empty() {
                parts.push(game);
            }
        }

        (!parts.is_empty()).then(|| parts.join("-"))
    }
}

/// Filesystem-safe form of `text`: alphanumerics kept, runs of spaces,
/// dashes and underscores collapsed into one `-`, everything else dropped
pub fn slugify(text: &str, lower: bool) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            if lower {
                slug.extend(c.to_lowercase());
            } else {
                slug.push(c);
            }
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_dash = true;
        }
    }

    slug
}
