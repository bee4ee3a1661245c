//! Route access rules consulted by the request gate.

use crate::models::Role;
use axum::http::Method;

/// What a route requires of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// No identity needed.
    Public,
    /// Any validated identity.
    Authenticated,
    /// A validated identity holding at least one of these roles.
    Roles(Vec<Role>),
}

impl Access {
    /// Whether an identity with `roles` satisfies this requirement.
    pub fn permits(&self, roles: &[Role]) -> bool {
        match self {
            Access::Public | Access::Authenticated => true,
            Access::Roles(required) => required.iter().any(|r| roles.contains(r)),
        }
    }
}

#[derive(Debug, Clone)]
enum PathMatch {
    Exact(&'static str),
    /// The prefix itself and everything below it.
    Prefix(&'static str),
}

impl PathMatch {
    fn matches(&self, path: &str) -> bool {
        match self {
            PathMatch::Exact(p) => path == *p,
            PathMatch::Prefix(p) => {
                path == *p
                    || path
                        .strip_prefix(p)
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    /// None matches any method.
    method: Option<Method>,
    path: PathMatch,
    access: Access,
}

/// Ordered route rules. The first matching rule wins.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    rules: Vec<Rule>,
    fallback: Access,
}

impl RoutePolicy {
    /// A policy with no rules, applying `fallback` to every route.
    pub fn new(fallback: Access) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
        }
    }

    pub fn exact(mut self, method: Method, path: &'static str, access: Access) -> Self {
        self.rules.push(Rule {
            method: Some(method),
            path: PathMatch::Exact(path),
            access,
        });
        self
    }

    pub fn prefix(mut self, path: &'static str, access: Access) -> Self {
        self.rules.push(Rule {
            method: None,
            path: PathMatch::Prefix(path),
            access,
        });
        self
    }

    /// The rules this service runs with.
    pub fn standard() -> Self {
        RoutePolicy::new(Access::Authenticated)
            .exact(Method::GET, "/health", Access::Public)
            .exact(Method::POST, "/auth/login", Access::Public)
            .exact(Method::POST, "/auth/register", Access::Public)
            .exact(Method::POST, "/auth/refresh", Access::Public)
            .prefix("/api/admin", Access::Roles(vec![Role::Admin]))
            .prefix("/api", Access::Roles(vec![Role::User, Role::Admin]))
    }

    /// The requirement for a request.
    pub fn classify(&self, method: &Method, path: &str) -> &Access {
        self.rules
            .iter()
            .find(|rule| {
                rule.method.as_ref().map_or(true, |m| m == method) && rule.path.matches(path)
            })
            .map(|rule| &rule.access)
            .unwrap_or(&self.fallback)
    }
}
