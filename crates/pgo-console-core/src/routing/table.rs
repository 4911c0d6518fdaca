//! The console's route table.

pub const LOGIN_ROUTE: &str = "/login";
pub const SPLASH_ROUTE: &str = "/splash";
pub const DEFAULT_ROUTE: &str = "/dashboard";
pub const PASSWORD_CHANGE_ROUTE: &str = "/password-change";

/// Reachable without a session
const PUBLIC_ROUTES: &[&str] = &[SPLASH_ROUTE, LOGIN_ROUTE];

/// Behind the access gates. `:name` segments match any single segment.
const PROTECTED_ROUTES: &[&str] = &[
    DEFAULT_ROUTE,
    PASSWORD_CHANGE_ROUTE,
    "/users",
    "/users/create",
    "/users/roles",
    "/users/permissions",
    "/merchants",
    "/merchants/create",
    "/merchants/:uid/api-keys",
    "/merchants/:merchantUid/crypto-keys",
    "/payment-gateways",
    "/payment-gateways/create",
    "/payment-channels",
    "/payment-channels/create",
    "/transactions",
    "/gateway-channel-mapping",
    "/disbursements",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatch {
    Public(String),
    Protected(String),
    /// Path to follow instead of the requested one
    Redirect(&'static str),
}

/// Strip query, fragment and trailing slashes; always start with `/`.
pub fn normalize(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_matches('/');
    format!("/{}", trimmed)
}

fn matches_pattern(pattern: &str, path: &str) -> bool {
    let mut pattern_segments = pattern.trim_start_matches('/').split('/');
    let mut path_segments = path.trim_start_matches('/').split('/');
    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (None, None) => return true,
            (Some(p), Some(s)) if p.starts_with(':') && !s.is_empty() => continue,
            (Some(p), Some(s)) if p == s => continue,
            _ => return false,
        }
    }
}

pub fn resolve(path: &str) -> RouteMatch {
    let path = normalize(path);
    if path == "/" {
        return RouteMatch::Redirect(SPLASH_ROUTE);
    }
    if PUBLIC_ROUTES.contains(&path.as_str()) {
        return RouteMatch::Public(path);
    }
    if PROTECTED_ROUTES.iter().any(|pattern| matches_pattern(pattern, &path)) {
        return RouteMatch::Protected(path);
    }
    RouteMatch::Redirect(DEFAULT_ROUTE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("dashboard"), "/dashboard");
        assert_eq!(normalize("/dashboard/"), "/dashboard");
        assert_eq!(normalize("/transactions?page=2#top"), "/transactions");
    }

    #[test]
    fn test_resolve() {
        assert_eq!(resolve("/"), RouteMatch::Redirect(SPLASH_ROUTE));
        assert_eq!(resolve("/login"), RouteMatch::Public("/login".into()));
        assert_eq!(resolve("/dashboard"), RouteMatch::Protected("/dashboard".into()));
        assert_eq!(resolve("/nowhere"), RouteMatch::Redirect(DEFAULT_ROUTE));
        assert_eq!(resolve("/users/roles"), RouteMatch::Protected("/users/roles".into()));
    }

    #[test]
    fn test_parameterized_routes() {
        assert_eq!(
            resolve("/merchants/MRC-001/api-keys"),
            RouteMatch::Protected("/merchants/MRC-001/api-keys".into())
        );
        assert_eq!(
            resolve("/merchants/MRC-001/crypto-keys"),
            RouteMatch::Protected("/merchants/MRC-001/crypto-keys".into())
        );
        assert_eq!(resolve("/merchants/MRC-001"), RouteMatch::Redirect(DEFAULT_ROUTE));
        assert_eq!(resolve("/merchants//api-keys"), RouteMatch::Redirect(DEFAULT_ROUTE));
    }
}
