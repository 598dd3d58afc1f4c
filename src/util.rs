//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values in a single pass,
/// so placeholder-looking text inside a substituted value is never expanded again.
/// Braces that don't name a known key (e.g. example JSON in a prompt) are copied as-is.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  while let Some(open) = rest.find('{') {
    out.push_str(&rest[..open]);
    let after = &rest[open + 1..];
    let hit = after.find('}').and_then(|close| {
      let key = &after[..close];
      pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| (close, *v))
    });
    match hit {
      Some((close, value)) => {
        out.push_str(value);
        rest = &after[close + 1..];
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

/// Log-safe preview of a possibly large string (char-boundary safe).
/// Avoids spamming logs with full user submissions or model output.
pub fn preview(s: &str, max_chars: usize) -> String {
  let mut chars = s.chars();
  let head: String = chars.by_ref().take(max_chars).collect();
  if chars.next().is_some() { format!("{head}…") } else { head }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fills_known_keys_and_keeps_other_braces() {
    let out = fill_template(
      "Category: {category}\n{\n  \"title\": \"...\"\n}",
      &[("category", "emergency")],
    );
    assert_eq!(out, "Category: emergency\n{\n  \"title\": \"...\"\n}");
  }

  #[test]
  fn substituted_values_are_not_expanded_again() {
    let out = fill_template(
      "{scenario_title} / {user_response}",
      &[("scenario_title", "{user_response}"), ("user_response", "hello")],
    );
    assert_eq!(out, "{user_response} / hello");
  }

  #[test]
  fn unterminated_brace_is_copied() {
    assert_eq!(fill_template("a { b", &[("b", "x")]), "a { b");
  }

  #[test]
  fn preview_truncates_on_char_boundary() {
    assert_eq!(preview("héllo wörld", 5), "héllo…");
    assert_eq!(preview("short", 10), "short");
  }
}
