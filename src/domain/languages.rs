/// Deck column name and the vernacular-name language codes merged into it.
pub const LANGUAGES: &[(&str, &[&str])] = &[
    ("English", &["eng"]),
    ("Afrikaans", &["afr"]),
    ("Albanian", &["alb"]),
    ("Arabic", &["ara"]),
    ("Armenian", &["arm"]),
    ("Azerbaijani", &["aze"]),
    ("Belarusian", &["bel"]),
    ("Bengali", &["ben"]),
    ("Bulgarian", &["bul"]),
    ("Catalan", &["cat"]),
    ("Chinese", &["zh-cn", "chi"]),
    ("Croatian", &["hrv"]),
    ("Czech", &["cze"]),
    ("Danish", &["dan"]),
    ("Dutch", &["dut"]),
    ("Estonian", &["est"]),
    ("Finnish", &["fin"]),
    ("French", &["fre"]),
    ("Galician", &["glg"]),
    ("Georgian", &["geo"]),
    ("German", &["ger"]),
    ("Greek", &["gre"]),
    ("Hebrew", &["heb"]),
    ("Hungarian", &["hun"]),
    ("Icelandic", &["ice"]),
    ("Indonesian", &["ind"]),
    ("Italian", &["ita"]),
    ("Japanese", &["jpn"]),
    ("Kazakh", &["kaz"]),
    ("Korean", &["kor"]),
    ("Latvian", &["lav"]),
    ("Lithuanian", &["lit"]),
    ("Macedonian", &["mac"]),
    ("Malay", &["may"]),
    ("Maltese", &["mlt"]),
    ("Mongolian", &["mon"]),
    ("Nepali", &["nep"]),
    ("Norwegian", &["nor", "nob"]),
    ("Persian", &["per"]),
    ("Polish", &["pol"]),
    ("Portuguese", &["por"]),
    ("Romanian", &["rum"]),
    ("Russian", &["rus"]),
    ("Serbian", &["srp"]),
    ("Slovak", &["slo"]),
    ("Slovenian", &["slv"]),
    ("Spanish", &["spa", "sp"]),
    ("Swahili", &["swa"]),
    ("Swedish", &["swe"]),
    ("Thai", &["tha"]),
    ("Turkish", &["tur"]),
    ("Ukrainian", &["ukr"]),
    ("Uzbek", &["uzb"]),
    ("Vietnamese", &["vie"]),
];

pub fn language_names() -> impl Iterator<Item = &'static str> {
    LANGUAGES.iter().map(|(name, _)| *name)
}

/// Column a vernacular-name language code belongs to.
pub fn language_for_code(code: &str) -> Option<&'static str> {
    LANGUAGES
        .iter()
        .find(|(_, codes)| codes.contains(&code))
        .map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_table() {
        assert_eq!(LANGUAGES.len(), 54);
        assert_eq!(language_names().next(), Some("English"));
        assert_eq!(language_for_code("chi"), Some("Chinese"));
        assert_eq!(language_for_code("zh-cn"), Some("Chinese"));
        assert_eq!(language_for_code("nob"), Some("Norwegian"));
        assert_eq!(language_for_code("xx"), None);
    }
}
