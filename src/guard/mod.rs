//! Route guard policy.
//!
//! The policy table is plain data built once at startup. Both evaluation
//! points, the edge middleware ([`edge`]) and the in-application guard
//! ([`crate::client::AppGuard`]), call [`RoutePolicy::evaluate`] so they cannot
//! drift apart.
//!
//! | Path class | Session | Decision |
//! |---|---|---|
//! | public / unlisted | any | allow |
//! | protected | present | allow |
//! | protected | absent | redirect to login with `?redirect=<path>` |
//! | login page | present | redirect to landing page |

pub mod edge;

use std::collections::BTreeMap;

/// Query parameter carrying the path to return to after login.
pub const RETURN_PARAM: &str = "redirect";

/// Classification of a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Login,
    Protected,
    Public,
    /// Not named in either table; allowed.
    Unlisted,
}

/// Outcome of evaluating a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// Protected path without a session.
    RedirectToLogin(String),
    /// Login page while a session is present.
    RedirectToLanding(String),
}

impl GuardDecision {
    pub fn location(&self) -> Option<&str> {
        match self {
            GuardDecision::Allow => None,
            GuardDecision::RedirectToLogin(to) | GuardDecision::RedirectToLanding(to) => Some(to),
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Node {
    children: BTreeMap<String, Node>,
    terminal: bool,
}

/// Set of path prefixes matched on whole segments.
///
/// `/patients` matches `/patients` and `/patients/42` but not `/patientsx`.
/// The root entry `/` only matches `/` itself.
#[derive(Debug, Default, Clone)]
pub struct PrefixSet {
    root: Node,
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl PrefixSet {
    pub fn insert(&mut self, path: &str) {
        let mut node = &mut self.root;
        for segment in segments(path) {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.terminal = true;
    }

    pub fn matches(&self, path: &str) -> bool {
        let mut segs = segments(path).peekable();
        if segs.peek().is_none() {
            return self.root.terminal;
        }

        let mut node = &self.root;
        for segment in segs {
            match node.children.get(segment) {
                Some(child) if child.terminal => return true,
                Some(child) => node = child,
                None => return false,
            }
        }
        false
    }
}

impl<'a> FromIterator<&'a str> for PrefixSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = PrefixSet::default();
        for path in iter {
            set.insert(path);
        }
        set
    }
}

/// Immutable route policy shared by both guard evaluation points.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    public: PrefixSet,
    protected: PrefixSet,
    login_path: String,
    landing_path: String,
}

/// Public paths of the clinic front end.
pub const DEFAULT_PUBLIC_PATHS: &[&str] = &["/", "/about", "/login"];

/// Administrative paths that require a session.
pub const DEFAULT_PROTECTED_PATHS: &[&str] = &[
    "/dashboard",
    "/patients",
    "/appointments",
    "/inquiries",
    "/settings",
];

pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_LANDING_PATH: &str = "/dashboard";

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_PUBLIC_PATHS.iter().copied(),
            DEFAULT_PROTECTED_PATHS.iter().copied(),
            DEFAULT_LOGIN_PATH,
            DEFAULT_LANDING_PATH,
        )
    }
}

impl RoutePolicy {
    pub fn new<'a>(
        public: impl IntoIterator<Item = &'a str>,
        protected: impl IntoIterator<Item = &'a str>,
        login_path: &str,
        landing_path: &str,
    ) -> Self {
        Self {
            public: public.into_iter().collect(),
            protected: protected.into_iter().collect(),
            login_path: login_path.to_string(),
            landing_path: landing_path.to_string(),
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn landing_path(&self) -> &str {
        &self.landing_path
    }

    pub fn is_login_path(&self, path: &str) -> bool {
        segments(path).eq(segments(&self.login_path))
    }

    pub fn classify(&self, path: &str) -> PathClass {
        if self.is_login_path(path) {
            PathClass::Login
        } else if self.protected.matches(path) {
            PathClass::Protected
        } else if self.public.matches(path) {
            PathClass::Public
        } else {
            PathClass::Unlisted
        }
    }

    /// Decide what happens to a navigation to `path`.
    pub fn evaluate(&self, path: &str, session_present: bool) -> GuardDecision {
        match (self.classify(path), session_present) {
            (PathClass::Login, true) => GuardDecision::RedirectToLanding(self.landing_path.clone()),
            (PathClass::Protected, false) => GuardDecision::RedirectToLogin(self.login_url(path)),
            _ => GuardDecision::Allow,
        }
    }

    /// Login URL preserving `path` as the return target.
    pub fn login_url(&self, path: &str) -> String {
        // Keep '/' readable; everything else that could break the query is escaped.
        let target = urlencoding::encode(path).replace("%2F", "/");
        format!("{}?{}={}", self.login_path, RETURN_PARAM, target)
    }

    /// Where to go after a successful login.
    ///
    /// Only same-origin absolute paths are honoured; anything else (absent,
    /// protocol-relative, backslash tricks, the login page itself) falls back
    /// to the landing page.
    pub fn return_target(&self, requested: Option<&str>) -> String {
        match requested {
            Some(target)
                if target.starts_with('/')
                    && !target.starts_with("//")
                    && !target.contains('\\')
                    && !self.is_login_path(target.split('?').next().unwrap_or_default()) =>
            {
                target.to_string()
            }
            _ => self.landing_path.clone(),
        }
    }
}
