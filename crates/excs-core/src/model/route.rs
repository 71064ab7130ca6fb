// ── Routes and automations ──

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use strum::Display;

use crate::error::CoreError;

static DETAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^jA\s+(?P<id>\d+)\s+(?P<type>[RAX])(?:\s+"(?P<desc>[^"]*)")?\s*$"#)
        .expect("route detail pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum RouteType {
    Route,
    Automation,
    /// Reported for ids the station has no definition for.
    Unknown,
}

impl RouteType {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'R' => Some(Self::Route),
            'A' => Some(Self::Automation),
            'X' => Some(Self::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    id: u32,
    pub route_type: RouteType,
    pub description: String,
}

impl Route {
    pub fn new(id: u32, route_type: RouteType, description: &str) -> Self {
        let description = if description.is_empty() {
            format!("{route_type} {id}")
        } else {
            description.to_owned()
        };
        Self {
            id,
            route_type,
            description,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn from_detail_response(response: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::invalid("route detail", response);
        let caps = DETAIL_RE.captures(response).ok_or_else(invalid)?;

        let id = caps["id"].parse().map_err(|_| invalid())?;
        let route_type = caps["type"]
            .chars()
            .next()
            .and_then(RouteType::from_char)
            .ok_or_else(invalid)?;
        let description = caps.name("desc").map_or("", |m| m.as_str());

        Ok(Self::new(id, route_type, description))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_route_with_description() {
        let route = Route::from_detail_response(r#"jA 5 R "Siding Loop""#).unwrap();
        assert_eq!(route, Route::new(5, RouteType::Route, "Siding Loop"));
        assert_eq!(route.id(), 5);
    }

    #[test]
    fn missing_description_uses_type_name() {
        assert_eq!(
            Route::from_detail_response("jA 5 A").unwrap().description,
            "Automation 5"
        );
        assert_eq!(
            Route::from_detail_response(r#"jA 6 X """#).unwrap().description,
            "Unknown 6"
        );
    }

    #[test]
    fn unknown_type_is_parsed() {
        let route = Route::from_detail_response("jA 6 X").unwrap();
        assert_eq!(route.route_type, RouteType::Unknown);
    }

    #[test]
    fn rejects_bad_type() {
        assert!(matches!(
            Route::from_detail_response("jA 5 Q"),
            Err(CoreError::InvalidResponse { .. })
        ));
        assert!(Route::from_detail_response("jT 5 R").is_err());
        assert!(Route::from_detail_response("jA 5 RX").is_err());
        assert!(Route::from_detail_response(r#"jA 5 R "Loop" trailing"#).is_err());
    }
}
