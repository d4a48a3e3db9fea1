/// Normalize text before classification: lowercase, strip everything
/// outside `{ascii letters, whitespace, '.', ',', '!', '?'}`, collapse
/// whitespace runs to single spaces.
///
/// Pure and idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let kept: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || c.is_whitespace() || matches!(c, '.' | ',' | '!' | '?'))
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}
