use std::fmt;

/// A single entry of the routing table.
///
/// The match conditions print in a fixed order: the exact-path condition,
/// host regexes, path regexes, then everything in `predicates`. Two routes
/// are equal iff all fields are equal; the data client relies on this for
/// its update delta.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Route {
    pub id: String,

    /// Argument of an exact-path condition (`Path("/foo")`).
    pub path: Option<String>,

    pub host_regexps: Vec<String>,
    pub path_regexps: Vec<String>,

    /// Remaining match conditions, in order.
    pub predicates: Vec<Predicate>,

    /// Filter chain, in application order.
    pub filters: Vec<Filter>,

    pub backend: Backend,
}

/// A match condition other than the dedicated path/host fields of [`Route`].
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// `PathSubtree("/prefix")` — matches the path and everything below it.
    PathSubtree(String),

    /// `Traffic(0.25)` — probabilistic traffic split.
    Traffic(f64),

    /// `True()` — always matches; padding that adjusts a route's rank in the
    /// predicate-count ordering of the matching tree.
    True,

    /// An opaque expression delegated to the engine's predicate parser.
    Raw(String),
}

/// One element of a route's filter chain.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// `status(502)` — fixed response status.
    Status(u16),

    /// `redirectTo(308, "https:")`
    RedirectTo(u16, String),

    /// `setRequestHeader("Host", "example.org")`
    SetRequestHeader(String, String),

    /// `disableAccessLog(200)`
    DisableAccessLog(u16),

    /// An opaque expression delegated to the engine's filter parser.
    Raw(String),
}

/// Where a matched request is sent.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Backend {
    /// Respond from the proxy without contacting an upstream.
    #[default]
    Shunt,

    /// A single upstream URL.
    Network(String),

    /// Load-balanced over a member list.
    LoadBalanced {
        endpoints: Vec<String>,
        algorithm: Option<String>,
    },
}

// === impl Route ===

impl Route {
    /// Number of path conditions carried by this route, across the dedicated
    /// fields and the predicate list. A well-formed route has at most one.
    pub fn path_condition_count(&self) -> usize {
        let own = usize::from(self.path.is_some());
        own + self
            .predicates
            .iter()
            .filter(|p| p.is_path_condition())
            .count()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.id)?;

        let mut any = false;
        let mut sep = |f: &mut fmt::Formatter<'_>| -> fmt::Result {
            if any {
                f.write_str(" && ")?;
            }
            any = true;
            Ok(())
        };

        if let Some(path) = &self.path {
            sep(f)?;
            write!(f, "Path(\"{}\")", path)?;
        }
        for rx in &self.host_regexps {
            sep(f)?;
            write!(f, "Host(/{}/)", escape_regexp(rx))?;
        }
        for rx in &self.path_regexps {
            sep(f)?;
            write!(f, "PathRegexp(/{}/)", escape_regexp(rx))?;
        }
        for p in &self.predicates {
            sep(f)?;
            write!(f, "{}", p)?;
        }
        if !any {
            f.write_str("*")?;
        }

        for filter in &self.filters {
            write!(f, " -> {}", filter)?;
        }

        write!(f, " -> {};", self.backend)
    }
}

// The textual form delimits regexes with slashes, so literal slashes in the
// expression are escaped.
fn escape_regexp(rx: &str) -> String {
    rx.replace('/', "\\/")
}

// === impl Predicate ===

impl Predicate {
    /// The predicate's name as it appears in the textual form.
    pub fn name(&self) -> &str {
        match self {
            Predicate::PathSubtree(_) => "PathSubtree",
            Predicate::Traffic(_) => "Traffic",
            Predicate::True => "True",
            Predicate::Raw(s) => s.split('(').next().unwrap_or("").trim(),
        }
    }

    /// Whether this predicate constrains the request path.
    pub fn is_path_condition(&self) -> bool {
        matches!(self.name(), "Path" | "PathSubtree")
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::PathSubtree(path) => write!(f, "PathSubtree(\"{}\")", path),
            Predicate::Traffic(weight) => write!(f, "Traffic({})", weight),
            Predicate::True => f.write_str("True()"),
            Predicate::Raw(s) => f.write_str(s),
        }
    }
}

// === impl Filter ===

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Status(code) => write!(f, "status({})", code),
            Filter::RedirectTo(code, location) => {
                write!(f, "redirectTo({}, \"{}\")", code, location)
            }
            Filter::SetRequestHeader(name, value) => {
                write!(f, "setRequestHeader(\"{}\", \"{}\")", name, value)
            }
            Filter::DisableAccessLog(code) => write!(f, "disableAccessLog({})", code),
            Filter::Raw(s) => f.write_str(s),
        }
    }
}

// === impl Backend ===

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Shunt => f.write_str("<shunt>"),
            Backend::Network(url) => write!(f, "\"{}\"", url),
            Backend::LoadBalanced {
                endpoints,
                algorithm,
            } => {
                f.write_str("<")?;
                if let Some(algorithm) = algorithm {
                    f.write_str(algorithm)?;
                    if !endpoints.is_empty() {
                        f.write_str(", ")?;
                    }
                }
                for (i, ep) in endpoints.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "\"{}\"", ep)?;
                }
                f.write_str(">")
            }
        }
    }
}
