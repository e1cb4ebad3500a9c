//! Materializes resolved links as markup.

use crate::types::{LinkTarget, LinkText, ResolvedLink};

/// Escape text content.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    return out;
}

/// Escape an attribute value for double quotes.
pub fn escape_attr(value: &str) -> String {
    return escape_text(value).replace('"', "&quot;");
}

/// Link text as markup.
fn text_markup(text: &LinkText) -> String {
    return match text {
        LinkText::Markup(markup) => markup.clone(),
        LinkText::Plain(plain) => escape_text(plain),
    };
}

/// Render one resolved link.
pub fn render(link: &ResolvedLink) -> String {
    let text = text_markup(&link.text);
    return match &link.target {
        LinkTarget::None => format!(r#"<span class="nolink">{text}</span>"#),
        LinkTarget::SelfLink => format!(r#"<span class="selflink">{text}</span>"#),
        LinkTarget::Local { href } => format!(r#"<a href="{}">{text}</a>"#, escape_attr(href)),
        LinkTarget::Index { keyword } => {
            format!(r#"<mshelp:link keywords="{}" tabindex="0">{text}</mshelp:link>"#, escape_attr(keyword))
        },
        LinkTarget::External { frame, url } => {
            format!(r#"<a href="{}" target="{}">{text}</a>"#, escape_attr(url), escape_attr(frame))
        },
        LinkTarget::SyntheticId { uri } => format!(r#"<a href="{}">{text}</a>"#, escape_attr(uri)),
    };
}

/// Rewrite `target` (relative to the output root) so it is relative to the
/// directory of `base`, also relative to the output root. Both use `/` or `\`.
pub fn relative_path(target: &str, base: &str) -> String {
    let target = target.replace('\\', "/");
    let base = base.replace('\\', "/");
    let target_parts: Vec<&str> = target.split('/').filter(|p| return !p.is_empty() && *p != ".").collect();
    let mut base_dirs: Vec<&str> = base.split('/').filter(|p| return !p.is_empty() && *p != ".").collect();
    // the last base segment is the document itself
    base_dirs.pop();

    let Some((file, target_dirs)) = target_parts.split_last() else {
        return String::new();
    };
    let common = base_dirs
        .iter()
        .zip(target_dirs.iter())
        .take_while(|(a, b)| return a.eq_ignore_ascii_case(b))
        .count();

    let mut parts: Vec<&str> = Vec::new();
    for _ in common..base_dirs.len() {
        parts.push("..");
    }
    parts.extend(target_dirs.iter().skip(common));
    parts.push(*file);
    return parts.join("/");
}
