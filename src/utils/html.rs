use std::collections::HashSet;

/// Sanitizes user-supplied rich text (post bodies, comments, bank questions).
///
/// Safe formatting tags survive; scripts, iframes and event-handler attributes
/// are removed together with their content.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Strips every tag, keeping only the text. Used for titles and section names,
/// which are rendered as plain strings.
pub fn clean_text(input: &str) -> String {
    ammonia::Builder::default()
        .tags(HashSet::new())
        .clean(input)
        .to_string()
        .trim()
        .to_string()
}
