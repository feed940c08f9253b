use super::LabelConfig;

/// Normalize a printed talker label so trivial variants collapse to one key.
///
/// "Wilson, Tim MP", "Mr Tim WILSON" and "tim  wilson" all become
/// "tim wilson". Returns an empty string when nothing but honorifics remain.
pub fn normalize_label(label: &str, config: &LabelConfig) -> String {
    // "Surname, Given names ..." -> "Given names ... Surname"
    let reordered = match label.split_once(',') {
        Some((surname, rest)) if !rest.trim().is_empty() => format!("{} {}", rest, surname),
        _ => label.to_string(),
    };

    reordered
        .split(|c: char| c.is_whitespace() || c == ',' || c == '.' || c == '(' || c == ')')
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '\'')
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|word| !word.is_empty() && !config.is_honorific(word))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_collapse() {
        let config = LabelConfig::default();
        let expected = "tim wilson";
        assert_eq!(normalize_label("Wilson, Tim MP", &config), expected);
        assert_eq!(normalize_label("Mr Tim WILSON", &config), expected);
        assert_eq!(normalize_label("  tim   wilson ", &config), expected);
        assert_eq!(normalize_label("Hon. Tim Wilson MP", &config), expected);
    }

    #[test]
    fn test_keeps_hyphens_and_apostrophes() {
        let config = LabelConfig::default();
        assert_eq!(
            normalize_label("O'Neil, Clare Ellen MP", &config),
            "clare ellen o'neil"
        );
        assert_eq!(
            normalize_label("Senator Hanson-Young", &config),
            "hanson-young"
        );
    }

    #[test]
    fn test_honorifics_only() {
        let config = LabelConfig::default();
        assert_eq!(normalize_label("The Hon. Mr", &config), "");
    }

    #[test]
    fn test_office_titles_survive() {
        let config = LabelConfig::default();
        assert_eq!(normalize_label("The SPEAKER", &config), "speaker");
        assert_eq!(
            normalize_label("Honourable members", &config),
            "honourable members"
        );
    }
}
