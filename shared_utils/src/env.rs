/// Expands `$NAME` and `${NAME}` references, resolving names through `lookup`.
///
/// References `lookup` cannot resolve are left in place untouched, so a config
/// value like `"$HOME/data"` expands while `"price$"` survives as-is.
pub fn expand_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed, braced) = if let Some(inner) = after.strip_prefix('{') {
            match inner.find('}') {
                Some(end) => (&inner[..end], end + 2, true),
                None => ("", 0, true),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end, false)
        };

        if name.is_empty() {
            out.push('$');
            rest = after;
            continue;
        }

        match lookup(name) {
            Some(value) => out.push_str(&value),
            None if braced => {
                out.push_str("${");
                out.push_str(name);
                out.push('}');
            }
            None => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "DATA_DIR" => Some("/srv/data".to_string()),
            "TZ_NAME" => Some("Europe/Madrid".to_string()),
            _ => None,
        }
    }

    #[test]
    fn expands_plain_and_braced_references() {
        assert_eq!(expand_with("$DATA_DIR/raw", lookup), "/srv/data/raw");
        assert_eq!(expand_with("${TZ_NAME}", lookup), "Europe/Madrid");
        assert_eq!(
            expand_with("${DATA_DIR}_${TZ_NAME}", lookup),
            "/srv/data_Europe/Madrid"
        );
    }

    #[test]
    fn unknown_references_are_left_alone() {
        assert_eq!(expand_with("$NOPE/x", lookup), "$NOPE/x");
        assert_eq!(expand_with("${NOPE}", lookup), "${NOPE}");
        assert_eq!(expand_with("price$", lookup), "price$");
        assert_eq!(expand_with("${unterminated", lookup), "${unterminated");
    }
}
