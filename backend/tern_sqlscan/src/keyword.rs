//! Keyword classification for the redaction-relevant subset of SQL.
//!
//! Lookup is a binary search over a sorted static table, so the cost per
//! identifier is `O(log n)` with no allocation. The table only carries the
//! keywords the statement classifier cares about; everything else scans as
//! a plain identifier, which is exactly what the redaction state machine
//! wants (it keys on shapes like `CREATE USER`, not on full SQL grammar).

/// Keywords recognized by the scanner.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Keyword {
    Alter,
    As,
    Authorization,
    By,
    Create,
    Data,
    Database,
    Do,
    Encrypted,
    Execute,
    Foreign,
    Function,
    Group,
    Identified,
    Immediate,
    Is,
    Link,
    Local,
    Options,
    Password,
    Procedure,
    Replace,
    Role,
    Server,
    Session,
    Set,
    Source,
    Table,
    User,
}

/// Sorted (keyword text, variant) table. Must stay sorted by the first
/// column; `keyword_lookup` binary-searches it.
static KEYWORDS: &[(&str, Keyword)] = &[
    ("alter", Keyword::Alter),
    ("as", Keyword::As),
    ("authorization", Keyword::Authorization),
    ("by", Keyword::By),
    ("create", Keyword::Create),
    ("data", Keyword::Data),
    ("database", Keyword::Database),
    ("do", Keyword::Do),
    ("encrypted", Keyword::Encrypted),
    ("execute", Keyword::Execute),
    ("foreign", Keyword::Foreign),
    ("function", Keyword::Function),
    ("group", Keyword::Group),
    ("identified", Keyword::Identified),
    ("immediate", Keyword::Immediate),
    ("is", Keyword::Is),
    ("link", Keyword::Link),
    ("local", Keyword::Local),
    ("options", Keyword::Options),
    ("password", Keyword::Password),
    ("procedure", Keyword::Procedure),
    ("replace", Keyword::Replace),
    ("role", Keyword::Role),
    ("server", Keyword::Server),
    ("session", Keyword::Session),
    ("set", Keyword::Set),
    ("source", Keyword::Source),
    ("table", Keyword::Table),
    ("user", Keyword::User),
];

/// Classify an identifier, case-insensitively.
///
/// Returns `None` for anything that is not in the redaction-relevant
/// keyword set. `ident` must be an unquoted identifier (quoted identifiers
/// never match keywords).
pub(crate) fn keyword_lookup(ident: &str) -> Option<Keyword> {
    // Identifiers longer than the longest keyword can't match; this also
    // bounds the stack buffer below.
    const MAX_KEYWORD_LEN: usize = 13; // "authorization"
    if ident.len() > MAX_KEYWORD_LEN || !ident.is_ascii() {
        return None;
    }

    let mut lower = [0u8; MAX_KEYWORD_LEN];
    for (dst, src) in lower.iter_mut().zip(ident.bytes()) {
        *dst = src.to_ascii_lowercase();
    }
    let lower = &lower[..ident.len()];

    KEYWORDS
        .binary_search_by(|(text, _)| text.as_bytes().cmp(lower))
        .ok()
        .map(|i| KEYWORDS[i].1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted() {
        for pair in KEYWORDS.windows(2) {
            assert!(pair[0].0 < pair[1].0, "{} >= {}", pair[0].0, pair[1].0);
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(keyword_lookup("PASSWORD"), Some(Keyword::Password));
        assert_eq!(keyword_lookup("Password"), Some(Keyword::Password));
        assert_eq!(keyword_lookup("password"), Some(Keyword::Password));
    }

    #[test]
    fn non_keywords_miss() {
        assert_eq!(keyword_lookup("alice"), None);
        assert_eq!(keyword_lookup(""), None);
        assert_eq!(keyword_lookup("passwords"), None);
        assert_eq!(keyword_lookup("rôle"), None);
    }

    #[test]
    fn every_variant_is_reachable() {
        assert_eq!(keyword_lookup("authorization"), Some(Keyword::Authorization));
        assert_eq!(keyword_lookup("immediate"), Some(Keyword::Immediate));
        assert_eq!(keyword_lookup("encrypted"), Some(Keyword::Encrypted));
    }
}
