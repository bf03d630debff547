use rand::Rng;

/// Maximum length of the title-derived part of a slug.
const MAX_BASE_LEN: usize = 60;

/// Build a URL-friendly slug from a title.
///
/// The title is lowercased, runs of non-alphanumeric characters collapse to a
/// single `-`, and a random four-digit suffix keeps two resources with the
/// same title from colliding. The result always matches `^[a-z0-9-]+$`.
pub fn generate_slug(title: &str, fallback: &str) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(1000..10000);
    format!("{}-{suffix}", slug_base(title, fallback))
}

fn slug_base(title: &str, fallback: &str) -> String {
    let mut base = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !base.is_empty() {
                base.push('-');
            }
            pending_dash = false;
            base.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if base.len() >= MAX_BASE_LEN {
            break;
        }
    }
    let base = base.trim_end_matches('-').to_string();
    if base.is_empty() {
        fallback.to_string()
    } else {
        base
    }
}

/// Returns `true` if `s` is a well-formed slug.
pub fn is_valid_slug(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}
