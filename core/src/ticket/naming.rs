//! Ticket channel names

use crate::types::UserId;

/// Longest channel name Discord accepts
const MAX_CHANNEL_NAME_LEN: usize = 100;

/// Build the channel name for a user's ticket, e.g. `ticket-mira_k`.
///
/// Discord text channel names are lowercase and may only contain letters,
/// digits, `-` and `_`. Anything else becomes `-`; runs of `-` collapse.
/// If nothing usable is left the user id is used instead.
pub fn channel_name(prefix: &str, display_name: &str, user_id: UserId) -> String {
    let prefix = sanitize(prefix);
    let mut handle = sanitize(display_name);
    if handle.is_empty() {
        handle = user_id.to_string();
    }

    let name = if prefix.is_empty() {
        handle
    } else {
        format!("{}-{}", prefix, handle)
    };

    truncate(&name, MAX_CHANNEL_NAME_LEN)
}

fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars().flat_map(char::to_lowercase) {
        let mapped = if c.is_ascii_alphanumeric() || c == '_' { c } else { '-' };
        if mapped == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(mapped);
    }
    out.trim_end_matches('-').to_string()
}

fn truncate(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }
    name[..max].trim_end_matches('-').to_string()
}
