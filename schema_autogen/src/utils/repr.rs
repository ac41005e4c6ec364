//! Literal formatting for rendered migration commands

/// Quote a string the way the rendered command language writes string literals.
///
/// Single quotes are preferred; double quotes are used when the text contains a single quote
/// and no double quote.
pub fn quote(value: &str) -> String {
    let delimiter = if value.contains('\'') && !value.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(value.len() + 2);
    out.push(delimiter);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

/// `True` / `False`
pub fn boolean(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// `['a', 'b']`
pub fn quoted_list(values: &[String]) -> String {
    let items: Vec<String> = values.iter().map(|v| quote(v)).collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("x", "'x'")]
    #[case("it's", "\"it's\"")]
    #[case("say \"hi\"", "'say \"hi\"'")]
    #[case("both ' and \"", "'both \\' and \"'")]
    #[case("a\\b", "'a\\\\b'")]
    #[case("", "''")]
    fn quotes_literals(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(quote(input), expected);
    }

    #[test]
    fn renders_lists_and_booleans() {
        assert_eq!(quoted_list(&["a".to_string(), "b".to_string()]), "['a', 'b']");
        assert_eq!(boolean(false), "False");
    }
}
