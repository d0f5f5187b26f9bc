//! County set expressions in the CMS locality file.

/// How a locality's county list is expressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountySetExpr {
    /// `ALL COUNTIES`
    AllCounties,
    /// `ALL COUNTIES EXCEPT <list>`
    AllExcept(Vec<String>),
    /// `REST OF <state>`
    RestOfState,
    /// Comma- or slash-delimited explicit list.
    Explicit(Vec<String>),
}

impl CountySetExpr {
    /// The `expansion_method` value recorded on output rows.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::AllCounties => "all_counties",
            Self::AllExcept(_) => "all_counties_except",
            Self::RestOfState => "rest_of_state",
            Self::Explicit(_) => "explicit_list",
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c| c == ',' || c == '/')
        .map(|name| name.trim().to_ascii_uppercase())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Parse the raw `county_names` cell into a set expression.
///
/// An empty cell reads as `ALL COUNTIES`: single-county states and
/// statewide localities are published that way.
#[must_use]
pub fn parse_county_expr(raw: &str) -> CountySetExpr {
    let upper = raw.trim().to_ascii_uppercase();
    if upper.is_empty() || upper == "ALL COUNTIES" || upper == "ALL OTHER COUNTIES" {
        return CountySetExpr::AllCounties;
    }
    if let Some(rest) = upper.strip_prefix("ALL COUNTIES EXCEPT") {
        return CountySetExpr::AllExcept(split_list(rest));
    }
    if upper.starts_with("REST OF") {
        return CountySetExpr::RestOfState;
    }
    CountySetExpr::Explicit(split_list(&upper))
}
