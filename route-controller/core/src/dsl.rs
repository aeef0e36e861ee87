//! Syntactic handling of route-expression fragments.
//!
//! Ingress annotations and default-filter files embed expressions in the
//! engine's route definition language. The translator never interprets them;
//! it only needs to split them into individual filters, predicates, or whole
//! route definitions, and to recognize the path conditions among the
//! predicates. Everything else stays an opaque [`Predicate::Raw`] /
//! [`Filter::Raw`] fragment for the engine's own parser to judge.

use crate::{Backend, Filter, Predicate};
use thiserror::Error;

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ParseError {
    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("route expression is missing a backend")]
    MissingBackend,

    #[error("unsupported backend expression: {0}")]
    UnsupportedBackend(String),
}

/// A route definition embedded in an annotation.
///
/// The translator clones one of these per ingress path rule, attaching the
/// rule's host and path conditions on top.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteFragment {
    /// The definition's own identifier, when it carries one.
    pub label: Option<String>,

    /// Argument of an exact-path condition within the fragment.
    pub path: Option<String>,

    pub predicates: Vec<Predicate>,
    pub filters: Vec<Filter>,
    pub backend: Backend,
}

/// Splits a filter chain expression on top-level `->`.
pub fn parse_filters(s: &str) -> Result<Vec<Filter>, ParseError> {
    Ok(split_outside_strings(s, "->")?
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| Filter::Raw(part.to_string()))
        .collect())
}

/// Splits a predicate conjunction on top-level `&&`.
///
/// `PathSubtree` and `True` are recognized structurally so that later stages
/// can detect path conditions and padding; all other predicates stay raw.
pub fn parse_predicates(s: &str) -> Result<Vec<Predicate>, ParseError> {
    Ok(split_outside_strings(s, "&&")?
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_predicate)
        .collect())
}

/// Parses one or more `;`-separated route definitions.
pub fn parse_routes(s: &str) -> Result<Vec<RouteFragment>, ParseError> {
    split_outside_strings(s, ";")?
        .into_iter()
        .map(str::trim)
        .filter(|def| !def.is_empty())
        .map(parse_route_definition)
        .collect()
}

fn parse_predicate(s: &str) -> Predicate {
    if let Some(path) = string_arg(s, "PathSubtree") {
        return Predicate::PathSubtree(path);
    }
    if name_of(s) == "True" {
        return Predicate::True;
    }
    Predicate::Raw(s.to_string())
}

fn parse_route_definition(s: &str) -> Result<RouteFragment, ParseError> {
    let (label, rest) = split_label(s);

    let parts = split_outside_strings(rest, "->")?;
    if parts.len() < 2 {
        return Err(ParseError::MissingBackend);
    }

    let mut predicates = parse_predicates(parts[0])?;
    let filters = parts[1..parts.len() - 1]
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(|part| Filter::Raw(part.to_string()))
        .collect();
    let backend = parse_backend(parts[parts.len() - 1].trim())?;

    // An exact-path condition moves to the dedicated field.
    let mut path = None;
    if let Some(i) = predicates.iter().position(|p| p.name() == "Path") {
        if let Predicate::Raw(expr) = &predicates[i] {
            if let Some(arg) = string_arg(expr, "Path") {
                path = Some(arg);
                predicates.remove(i);
            }
        }
    }

    Ok(RouteFragment {
        label,
        path,
        predicates,
        filters,
        backend,
    })
}

fn parse_backend(s: &str) -> Result<Backend, ParseError> {
    if s.is_empty() {
        return Err(ParseError::MissingBackend);
    }
    if s == "<shunt>" {
        return Ok(Backend::Shunt);
    }
    if let Some(url) = s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Ok(Backend::Network(url.to_string()));
    }
    Err(ParseError::UnsupportedBackend(s.to_string()))
}

// A leading `name:` marks the definition's identifier; anything that is not
// a plain identifier before the colon belongs to the first predicate.
fn split_label(s: &str) -> (Option<String>, &str) {
    if let Some(i) = s.find(':') {
        let head = s[..i].trim();
        if !head.is_empty()
            && head
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return (Some(head.to_string()), &s[i + 1..]);
        }
    }
    (None, s)
}

fn name_of(s: &str) -> &str {
    s.split('(').next().unwrap_or("").trim()
}

// Extracts the single double-quoted argument of `name("arg")`.
fn string_arg(call: &str, name: &str) -> Option<String> {
    let rest = call.trim().strip_prefix(name)?.trim_start();
    let inner = rest.strip_prefix('(')?.trim_end().strip_suffix(')')?;
    let inner = inner.trim();
    let inner = inner.strip_prefix('"')?.strip_suffix('"')?;
    Some(inner.to_string())
}

// Splits on a separator, ignoring occurrences inside double-quoted strings.
// Separators are ASCII, so byte arithmetic on char indices is safe.
fn split_outside_strings<'a>(s: &'a str, sep: &str) -> Result<Vec<&'a str>, ParseError> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut skip = 0;

    for (i, c) in s.char_indices() {
        if skip > 0 {
            skip -= 1;
            continue;
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
            continue;
        }
        if s[i..].starts_with(sep) {
            parts.push(&s[start..i]);
            start = i + sep.len();
            skip = sep.len() - 1;
        }
    }

    if in_string {
        return Err(ParseError::UnterminatedString);
    }
    parts.push(&s[start..]);
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_filter_chains() {
        let filters = parse_filters("localRatelimit(20,\"1m\") -> consecutiveBreaker(15)")
            .expect("chain splits");
        assert_eq!(
            filters,
            vec![
                Filter::Raw("localRatelimit(20,\"1m\")".to_string()),
                Filter::Raw("consecutiveBreaker(15)".to_string()),
            ],
        );
    }

    #[test]
    fn arrow_inside_string_is_not_a_separator() {
        let filters =
            parse_filters("setRequestHeader(\"X-Note\", \"a -> b\") -> status(200)").unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(
            filters[0],
            Filter::Raw("setRequestHeader(\"X-Note\", \"a -> b\")".to_string()),
        );
    }

    #[test]
    fn recognizes_path_subtree_and_noop_predicates() {
        let predicates =
            parse_predicates("PathSubtree(\"/api\") && True() && QueryParam(\"q\", \"^x$\")")
                .unwrap();
        assert_eq!(
            predicates,
            vec![
                Predicate::PathSubtree("/api".to_string()),
                Predicate::True,
                Predicate::Raw("QueryParam(\"q\", \"^x$\")".to_string()),
            ],
        );
    }

    #[test]
    fn parses_route_definitions() {
        let fragments = parse_routes(
            "Method(\"OPTIONS\") -> <shunt>;\n\
             a: Cookie(\"alpha\", \"^enabled$\") -> \"http://1.1.2.0:8181\";\n\
             b: Path(\"/a/path/somewhere\") -> \"https://some.other-url.org/a/path\";",
        )
        .expect("all definitions parse");

        assert_eq!(fragments.len(), 3);

        assert_eq!(fragments[0].label, None);
        assert_eq!(
            fragments[0].predicates,
            vec![Predicate::Raw("Method(\"OPTIONS\")".to_string())],
        );
        assert_eq!(fragments[0].backend, Backend::Shunt);

        assert_eq!(fragments[1].label.as_deref(), Some("a"));
        assert_eq!(
            fragments[1].backend,
            Backend::Network("http://1.1.2.0:8181".to_string()),
        );

        assert_eq!(fragments[2].label.as_deref(), Some("b"));
        assert_eq!(fragments[2].path.as_deref(), Some("/a/path/somewhere"));
        assert!(fragments[2].predicates.is_empty());
    }

    #[test]
    fn route_definition_requires_a_backend() {
        assert_eq!(
            parse_routes("Method(\"OPTIONS\")"),
            Err(ParseError::MissingBackend),
        );
        assert_eq!(
            parse_routes("Method(\"GET\") -> <loopback>"),
            Err(ParseError::UnsupportedBackend("<loopback>".to_string())),
        );
    }

    #[test]
    fn unterminated_string_fails_the_parse() {
        assert_eq!(
            parse_filters("setRequestHeader(\"Host"),
            Err(ParseError::UnterminatedString),
        );
    }
}
