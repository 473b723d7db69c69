//! `${name}` placeholder substitution.

use std::collections::HashMap;

/// Replace every `${key}` in `text` with `vars[key]`.
///
/// Placeholders without a matching entry are kept verbatim. Substituted
/// values are inserted literally and never re-scanned.
pub fn resolve(text: &str, vars: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                let key = &after[..end];
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            _ => {
                // `${}` or unterminated: emit the opener and keep scanning.
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([("foo", "FOO"), ("num", "42")])
    }

    #[test]
    fn resolves_multiple_placeholders() {
        assert_eq!(resolve("Foo=${foo},Num=${num}", &vars()), "Foo=FOO,Num=42");
    }

    #[test]
    fn missing_placeholder_is_left_intact() {
        assert_eq!(resolve("Hello ${missing}!", &vars()), "Hello ${missing}!");
    }

    #[test]
    fn values_are_inserted_literally() {
        let vars = HashMap::from([("sp", "X$Y\\Z ${foo}"), ("foo", "FOO")]);
        assert_eq!(resolve("Path=${sp}", &vars), "Path=X$Y\\Z ${foo}");
    }

    #[test]
    fn malformed_openers_pass_through() {
        assert_eq!(resolve("cost: ${} and ${foo", &vars()), "cost: ${} and ${foo");
        assert_eq!(resolve("$foo ${foo}", &vars()), "$foo FOO");
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let text = "Course direction: knitting\n\n{\"levels\": []}";
        assert_eq!(resolve(text, &vars()), text);
    }
}
