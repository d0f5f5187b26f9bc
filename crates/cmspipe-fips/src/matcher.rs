//! Tiered county-name matching with an LSAD tie-break.

use similar::TextDiff;

use crate::reference::CountyRef;

/// Minimum token-set similarity for a fuzzy match.
pub const FUZZY_THRESHOLD: f64 = 0.92;

/// How a match was made, recorded on every output row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    Exact,
    Alias,
    Fuzzy,
}

impl MatchMethod {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Alias => "alias",
            Self::Fuzzy => "fuzzy",
        }
    }
}

/// Why a name failed to match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchFailure {
    /// No tier produced a candidate.
    NoMatch { name: String },
    /// Fuzzy matching found more than one candidate above the
    /// threshold and the LSAD hint could not separate them.
    Ambiguous { name: String, candidates: Vec<String> },
}

impl MatchFailure {
    /// Structured quarantine reason.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::NoMatch { name } => format!("no_county_match:{name}"),
            Self::Ambiguous { name, .. } => format!("ambiguous_county_match:{name}"),
        }
    }
}

fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// Token-set similarity: order-insensitive, duplicate-insensitive.
#[must_use]
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let canon = |s: &str| {
        let mut tokens: Vec<&str> = s.split_whitespace().collect();
        tokens.sort_unstable();
        tokens.dedup();
        tokens.join(" ")
    };
    let (a, b) = (canon(&normalize_name(a)), canon(&normalize_name(b)));
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    f64::from(TextDiff::from_chars(a.as_str(), b.as_str()).ratio())
}

/// Prefer an independent city when the fee area mentions CITY,
/// otherwise prefer the county. This is what separates VA's Richmond
/// city from Richmond County and MO's St. Louis pair.
fn lsad_tie_break<'a>(candidates: &[&'a CountyRef], fee_area: Option<&str>) -> Option<&'a CountyRef> {
    let wants_city = fee_area
        .map(|f| f.to_ascii_uppercase().contains("CITY"))
        .unwrap_or(false);
    let is_city = |c: &CountyRef| c.lsad.to_ascii_lowercase().contains("city");
    let preferred: Vec<&&CountyRef> = candidates
        .iter()
        .filter(|c| is_city(c) == wants_city)
        .collect();
    match preferred.as_slice() {
        [single] => Some(**single),
        _ => None,
    }
}

/// Match one raw county name against a state's counties.
///
/// Tiers: exact canonical name, exact alias, then (when enabled)
/// token-set similarity at or above [`FUZZY_THRESHOLD`], but only
/// when unambiguous. Same-name collisions inside a tier fall to the
/// LSAD tie-break.
pub fn match_county<'a>(
    raw: &str,
    candidates: &'a [CountyRef],
    use_fuzzy: bool,
    fee_area: Option<&str>,
) -> Result<(&'a CountyRef, MatchMethod), MatchFailure> {
    let name = normalize_name(raw);

    let exact: Vec<&CountyRef> = candidates.iter().filter(|c| c.name == name).collect();
    match exact.as_slice() {
        [single] => return Ok((*single, MatchMethod::Exact)),
        [] => {}
        many => {
            if let Some(chosen) = lsad_tie_break(many, fee_area) {
                return Ok((chosen, MatchMethod::Exact));
            }
            return Err(MatchFailure::Ambiguous {
                name,
                candidates: many.iter().map(|c| c.county_fips.clone()).collect(),
            });
        }
    }

    let alias: Vec<&CountyRef> = candidates
        .iter()
        .filter(|c| c.aliases.iter().any(|a| *a == name))
        .collect();
    match alias.as_slice() {
        [single] => return Ok((*single, MatchMethod::Alias)),
        [] => {}
        many => {
            if let Some(chosen) = lsad_tie_break(many, fee_area) {
                return Ok((chosen, MatchMethod::Alias));
            }
            return Err(MatchFailure::Ambiguous {
                name,
                candidates: many.iter().map(|c| c.county_fips.clone()).collect(),
            });
        }
    }

    if !use_fuzzy {
        return Err(MatchFailure::NoMatch { name });
    }

    let mut above: Vec<(&CountyRef, f64)> = candidates
        .iter()
        .map(|c| (c, token_set_ratio(&name, &c.name)))
        .filter(|(_, ratio)| *ratio >= FUZZY_THRESHOLD)
        .collect();
    above.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    match above.as_slice() {
        [] => Err(MatchFailure::NoMatch { name }),
        [(single, _)] => Ok((*single, MatchMethod::Fuzzy)),
        many => {
            let refs: Vec<&CountyRef> = many.iter().map(|(c, _)| *c).collect();
            if let Some(chosen) = lsad_tie_break(&refs, fee_area) {
                return Ok((chosen, MatchMethod::Fuzzy));
            }
            Err(MatchFailure::Ambiguous {
                name,
                candidates: many.iter().map(|(c, _)| c.county_fips.clone()).collect(),
            })
        }
    }
}
