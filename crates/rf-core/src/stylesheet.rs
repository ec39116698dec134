//! Element hiding stylesheet generation

/// Selectors per CSS rule.
pub const MAX_SELECTORS_PER_RULE: usize = 1024;

const HIDE_DECLARATION: &str = " {display: none !important;}\n";

/// Build a stylesheet hiding every element matched by `selectors`.
pub fn build_stylesheet<'a, I>(selectors: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut stylesheet = String::new();
    let mut in_rule = 0;

    for selector in selectors {
        if in_rule == MAX_SELECTORS_PER_RULE {
            stylesheet.push_str(HIDE_DECLARATION);
            in_rule = 0;
        }
        if in_rule > 0 {
            stylesheet.push_str(",\n");
        }
        stylesheet.push_str(selector);
        in_rule += 1;
    }

    if in_rule > 0 {
        stylesheet.push_str(HIDE_DECLARATION);
    }
    stylesheet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(build_stylesheet(std::iter::empty()), "");
    }

    #[test]
    fn test_single_rule() {
        assert_eq!(
            build_stylesheet([".ads", "#banner"]),
            ".ads,\n#banner {display: none !important;}\n"
        );
    }

    #[test]
    fn test_batches_selectors() {
        let selectors: Vec<String> = (0..MAX_SELECTORS_PER_RULE + 1).map(|i| format!(".s{i}")).collect();
        let stylesheet = build_stylesheet(selectors.iter().map(String::as_str));
        assert_eq!(stylesheet.matches("{display: none !important;}").count(), 2);
        assert!(stylesheet.ends_with(&format!(".s{MAX_SELECTORS_PER_RULE} {{display: none !important;}}\n")));
    }
}
