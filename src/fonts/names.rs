//! Name cleanup and matching helpers for font resolution.

/// Abbreviated file codes used by Korean word processors for their bundled
/// faces, mapped to the family those files declare.
pub(crate) const FILENAME_ALIASES: &[(&str, &str)] = &[
    ("h2gtre", "HY견고딕"),
    ("h2hdrm", "HY헤드라인M"),
    ("h2db", "HY둥근고딕"),
];

/// Lower-case keyword found in a source name → family to try.
pub(crate) const LOCALIZED_KEYWORDS: &[(&str, &str)] = &[
    ("dotum", "Dotum"),
    ("gulim", "Gulim"),
    ("batang", "Batang"),
    ("gungsuh", "GungSuh"),
    ("malgun", "Malgun Gothic"),
    ("nanumgothic", "NanumGothic"),
    ("hyshortsamul", "함초롬바탕"),
    ("hypmokgak", "HY목각파임B"),
];

const NOISE_TOKENS: &[&str] = &["MT", "PS", "Std", "Pro", "LT", "Roman"];

const BOLD_SUFFIXES: &[&str] = &[
    " Bold", "-Bold", " DemiBold", "-DemiBold", " SemiBold", "-SemiBold", " Black", "-Black",
    " Medium", "-Medium",
];
const ITALIC_SUFFIXES: &[&str] = &[" Italic", "-Italic", " Oblique", "-Oblique"];
const BOLD_ITALIC_SUFFIXES: &[&str] =
    &[" Bold Italic", "-BoldItalic", " BoldOblique", "-BoldOblique"];

/// `ABCDEF+Arial` → `Arial`. Only a six upper-case letter tag counts as a
/// subset prefix; anything else before a `+` is returned unchanged.
pub fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest))
            if tag.len() == 6 && tag.chars().all(|c| c.is_ascii_uppercase()) && !rest.is_empty() =>
        {
            rest
        }
        _ => name,
    }
}

/// Drops punctuation noise and vendor suffix tokens, collapses whitespace.
pub fn normalize(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if matches!(c, ',' | '(' | ')' | '[' | ']') { ' ' } else { c })
        .collect();
    let mut words = Vec::new();
    for word in spaced.split_whitespace() {
        let parts: Vec<&str> = word
            .split('-')
            .map(strip_glued_suffix)
            .filter(|p| !p.is_empty() && !NOISE_TOKENS.contains(p))
            .collect();
        if !parts.is_empty() {
            words.push(parts.join("-"));
        }
    }
    words.join(" ")
}

/// `ArialMT` → `Arial`, `TimesNewRomanPSMT` → `TimesNewRoman`.
fn strip_glued_suffix(part: &str) -> &str {
    for suffix in ["PSMT", "MT"] {
        if let Some(stem) = part.strip_suffix(suffix)
            && stem.chars().last().is_some_and(|c| c.is_lowercase())
        {
            return stem;
        }
    }
    part
}

/// Lower-cased, alphanumeric-only form used for the filename index.
pub fn file_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Loose spellings under which a registered name is also findable.
pub(crate) fn variations(name: &str) -> Vec<String> {
    let lower = name.to_lowercase();
    let mut out = vec![
        lower.replace(' ', ""),
        lower.replace('-', " "),
        lower.replace(' ', "-"),
        file_key(name),
        lower,
    ];
    out.retain(|v| !v.is_empty());
    out.dedup();
    out
}

/// Hyphen/space spellings registered next to every declared name.
pub(crate) fn spelling_variants(name: &str) -> [String; 2] {
    [name.replace('-', " "), name.replace(' ', "-")]
}

/// Registration order score: bold-like +2, italic-like +1, regular-like
/// resets to 0. Style bits stand in when the label carries no keyword.
pub(crate) fn priority_score(label: &str, bold: bool, italic: bool) -> u8 {
    let lower = label.to_lowercase();
    if ["regular", "book", "normal"].iter().any(|k| lower.contains(k)) {
        return 0;
    }
    let heavy = ["bold", "black", "heavy", "semibold", "demibold", "medium"]
        .iter()
        .any(|k| lower.contains(k));
    let slanted = ["italic", "oblique"].iter().any(|k| lower.contains(k));
    let mut score = 0;
    if heavy || bold {
        score += 2;
    }
    if slanted || italic {
        score += 1;
    }
    score
}

/// Whether a font file name already names a heavy weight.
pub fn denotes_bold(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    ["bold", "black", "heavy"].iter().any(|k| lower.contains(k))
}

pub fn denotes_italic(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    ["italic", "oblique"].iter().any(|k| lower.contains(k))
}

pub(crate) fn variant_suffixes(bold: bool, italic: bool) -> &'static [&'static str] {
    match (bold, italic) {
        (true, true) => BOLD_ITALIC_SUFFIXES,
        (true, false) => BOLD_SUFFIXES,
        (false, true) => ITALIC_SUFFIXES,
        (false, false) => &[],
    }
}

/// Ratcliff/Obershelp similarity in `[0, 1]`: twice the number of matched
/// characters over the combined length.
pub fn similarity(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f32 / total as f32
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, k) = longest_common_block(a, b);
    if k == 0 {
        return 0;
    }
    k + matched_chars(&a[..i], &b[..j]) + matched_chars(&a[i + k..], &b[j + k..])
}

/// Earliest longest common substring as (start in a, start in b, length).
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        for j in 0..b.len() {
            cur[j + 1] = if a[i] == b[j] { prev[j] + 1 } else { 0 };
            let k = cur[j + 1];
            if k > best.2 {
                best = (i + 1 - k, j + 1 - k, k);
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}
