/// Normalizes a display string into its canonical comparison key: trim and
/// lowercase, then collapse every maximal run of characters outside
/// `[a-z0-9-]` into a single `-`.
///
/// Two names denote the same term iff their slugs are equal.
pub fn slugify(input: &str) -> String {
    let trimmed = input.trim();
    let mut slug = String::with_capacity(trimmed.len());
    let mut in_run = false;
    for ch in trimmed.chars() {
        let ch = ch.to_ascii_lowercase();
        if matches!(ch, 'a'..='z' | '0'..='9' | '-') {
            in_run = false;
            slug.push(ch);
        } else if !in_run {
            in_run = true;
            slug.push('-');
        }
    }
    slug
}
