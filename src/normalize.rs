// 🔑 Normalized store keys
// Name + address are folded into one join key shared by the registry index,
// the alias table and the matcher.
//
// Problem solved:
// - " CU 편의점 (강남점) " / "CU편의점(강남점)" → same key
// - Franchise / category words ("복권방", "GS25", ...) don't split one store in two
// - Exact equality only: near-duplicates stay apart and go to manual aliasing

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Franchise and category words stripped before comparison, in removal order.
pub const STOP_TOKENS: [&str; 8] = [
    "복권방",
    "복권",
    "로또",
    "편의점",
    "CU",
    "GS25",
    "세븐일레븐",
    "미니스톱",
];

fn parenthetical_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(.*?\)").expect("static regex"))
}

// ============================================================================
// NORMALIZED KEY
// ============================================================================

/// Canonical `name|address` join key.
///
/// Two stores that normalize to the same key are treated as one store. Key
/// collisions are an accepted limitation and are not detected here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    pub fn new(name: &str, address: &str) -> Self {
        NormalizedKey(format!("{}|{}", normalize(name), normalize(address)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// STRING NORMALIZATION
// ============================================================================

/// Normalize one field for key comparison.
///
/// - Remove every whitespace character
/// - Drop parenthetical annotations like `(강남점)`
/// - Remove the fixed stop-token vocabulary and hyphens
///
/// Applied until the string stops changing, so removing one token can never
/// expose another one on a second call: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(s: &str) -> String {
    let mut current = normalize_once(s);
    loop {
        let next = normalize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn normalize_once(s: &str) -> String {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let mut out = parenthetical_re().replace_all(&compact, "").into_owned();
    for token in STOP_TOKENS {
        out = out.replace(token, "");
    }
    out.replace('-', "")
}

/// Collapse whitespace runs into a single space and trim.
pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ignores_spacing_and_annotations() {
        let a = NormalizedKey::new(" CU 편의점 (강남점) ", "서울 강남구");
        let b = NormalizedKey::new("CU편의점(강남점)", "서울강남구");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "|서울강남구");
    }

    #[test]
    fn test_normalize_strips_stop_tokens() {
        assert_eq!(normalize("GS25 행운 복권방"), "행운");
        assert_eq!(normalize("세븐일레븐 역삼-2호점"), "역삼2호점");
        assert_eq!(normalize("대박로또"), "대박");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            " CU 편의점 (강남점) ",
            "복로또권",
            "복-권 명당",
            "((중첩)) 괄호",
            "서울특별시 강남구 테헤란로 123-4",
            "",
            "   ",
            "미니스톱(본점)-1",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_token_exposed_by_removal_is_also_removed() {
        // Removing "로또" leaves "복권", which must go as well
        assert_eq!(normalize("복로또권"), "");
    }

    #[test]
    fn test_lowercase_franchise_names_are_kept() {
        assert_eq!(normalize("cu 마트"), "cu마트");
    }

    #[test]
    fn test_collapse_ws() {
        assert_eq!(collapse_ws("  서울   강남구\n\t1길 "), "서울 강남구 1길");
        assert_eq!(collapse_ws(""), "");
    }
}
