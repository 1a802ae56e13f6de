pub fn normalize(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|ch| if ch == '_' || ch == '-' { ' ' } else { ch })
        .collect();
    collapse_whitespace(&replaced).to_lowercase()
}

pub fn normalize_strict(value: &str) -> String {
    let stripped: String = value.chars().filter(|ch| *ch != '.' && *ch != ',').collect();
    normalize(&stripped).to_uppercase()
}

/// Upload folders are named `<CUSTOMER_TOKENS>_<HASH>[_...]`. Every token
/// before the first hash-like token (8+ hex digits, never the first token)
/// belongs to the customer name.
pub fn customer_from_folder(folder_name: &str) -> String {
    let tokens: Vec<&str> = folder_name.split('_').collect();
    let end = tokens
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, token)| is_hash_token(token))
        .map(|(idx, _)| idx)
        .unwrap_or(tokens.len());
    let joined = tokens[..end]
        .iter()
        .map(|token| token.trim())
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    collapse_whitespace(&joined)
}

/// Normalized base name of a file, extension included. `Front_Card.JPG`
/// and `front card.jpg` compare equal.
pub fn filename_key(name: &str) -> String {
    normalize(base_name(name))
}

pub fn filename_stem_key(name: &str) -> String {
    let base = base_name(name);
    let stem = match base.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|ch| ch.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => base,
    };
    normalize(stem)
}

fn base_name(name: &str) -> &str {
    let name = name.trim();
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

fn is_hash_token(token: &str) -> bool {
    token.len() >= 8 && token.chars().all(|ch| ch.is_ascii_hexdigit())
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
