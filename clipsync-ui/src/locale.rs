use clipsync_core::Language;

pub const FALLBACK_LOCALE: &str = "en";
pub const SUPPORTED_LOCALES: [&str; 2] = ["en", "zh-CN"];

/// Environment variables consulted for the system locale, highest priority first.
const LOCALE_VARS: [&str; 3] = ["LC_ALL", "LC_MESSAGES", "LANG"];

/// Maps a raw locale string (`zh_CN.UTF-8`, `en-us`, `zh`) onto a supported
/// display locale.
pub fn normalize_locale(raw: &str) -> Option<&'static str> {
    let base = raw
        .split(['.', '@'])
        .next()
        .unwrap_or_default()
        .trim()
        .replace('_', "-");
    if base.is_empty() || base.eq_ignore_ascii_case("C") || base.eq_ignore_ascii_case("POSIX") {
        return None;
    }

    let (language, region) = match base.split_once('-') {
        Some((language, region)) => (language.to_ascii_lowercase(), Some(region.to_ascii_uppercase())),
        None => (base.to_ascii_lowercase(), None),
    };

    let tag = match &region {
        Some(region) => format!("{language}-{region}"),
        None => language.clone(),
    };
    if let Some(exact) = SUPPORTED_LOCALES.iter().find(|l| l.eq_ignore_ascii_case(&tag)) {
        return Some(*exact);
    }
    SUPPORTED_LOCALES
        .iter()
        .find(|l| l.split('-').next() == Some(language.as_str()))
        .copied()
}

/// Resolves the display locale for a language preference. `lookup` reads an
/// environment variable.
pub fn resolve_locale_with(language: &Language, lookup: impl Fn(&str) -> Option<String>) -> String {
    let resolved = match language {
        Language::Locale(tag) => normalize_locale(tag),
        Language::System => LOCALE_VARS
            .iter()
            .filter_map(|var| lookup(*var))
            .find(|value| !value.trim().is_empty())
            .and_then(|value| normalize_locale(&value)),
    };
    resolved.unwrap_or(FALLBACK_LOCALE).to_owned()
}

pub fn resolve_locale(language: &Language) -> String {
    resolve_locale_with(language, |var| std::env::var(var).ok())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn posix_names_are_normalized() {
        assert_eq!(normalize_locale("zh_CN.UTF-8"), Some("zh-CN"));
        assert_eq!(normalize_locale("en_US.UTF-8"), Some("en"));
        assert_eq!(normalize_locale("zh-cn"), Some("zh-CN"));
        assert_eq!(normalize_locale("zh"), Some("zh-CN"));
        assert_eq!(normalize_locale("C"), None);
        assert_eq!(normalize_locale("fr_FR"), None);
    }

    #[test]
    fn system_language_reads_variables_in_priority_order() {
        let lookup = env(&[("LANG", "en_US.UTF-8"), ("LC_MESSAGES", "zh_CN.UTF-8")]);
        assert_eq!(resolve_locale_with(&Language::System, lookup), "zh-CN");

        let lookup = env(&[("LC_ALL", ""), ("LANG", "zh_CN.UTF-8")]);
        assert_eq!(resolve_locale_with(&Language::System, lookup), "zh-CN");
    }

    #[test]
    fn unknown_or_missing_falls_back_to_english() {
        assert_eq!(resolve_locale_with(&Language::System, env(&[])), "en");
        let lookup = env(&[("LANG", "de_DE.UTF-8")]);
        assert_eq!(resolve_locale_with(&Language::System, lookup), "en");
        let explicit = Language::Locale("ja-JP".to_owned());
        assert_eq!(resolve_locale_with(&explicit, env(&[])), "en");
    }

    #[test]
    fn explicit_language_ignores_environment() {
        let lookup = env(&[("LC_ALL", "en_US.UTF-8")]);
        let explicit = Language::Locale("zh_CN".to_owned());
        assert_eq!(resolve_locale_with(&explicit, lookup), "zh-CN");
    }
}
