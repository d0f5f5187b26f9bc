//! State name resolution.

use std::collections::HashMap;
use std::sync::LazyLock;

/// (display name, postal code, state FIPS).
const STATES: [(&str, &str, &str); 56] = [
    ("ALABAMA", "AL", "01"),
    ("ALASKA", "AK", "02"),
    ("ARIZONA", "AZ", "04"),
    ("ARKANSAS", "AR", "05"),
    ("CALIFORNIA", "CA", "06"),
    ("COLORADO", "CO", "08"),
    ("CONNECTICUT", "CT", "09"),
    ("DELAWARE", "DE", "10"),
    ("DISTRICT OF COLUMBIA", "DC", "11"),
    ("FLORIDA", "FL", "12"),
    ("GEORGIA", "GA", "13"),
    ("HAWAII", "HI", "15"),
    ("IDAHO", "ID", "16"),
    ("ILLINOIS", "IL", "17"),
    ("INDIANA", "IN", "18"),
    ("IOWA", "IA", "19"),
    ("KANSAS", "KS", "20"),
    ("KENTUCKY", "KY", "21"),
    ("LOUISIANA", "LA", "22"),
    ("MAINE", "ME", "23"),
    ("MARYLAND", "MD", "24"),
    ("MASSACHUSETTS", "MA", "25"),
    ("MICHIGAN", "MI", "26"),
    ("MINNESOTA", "MN", "27"),
    ("MISSISSIPPI", "MS", "28"),
    ("MISSOURI", "MO", "29"),
    ("MONTANA", "MT", "30"),
    ("NEBRASKA", "NE", "31"),
    ("NEVADA", "NV", "32"),
    ("NEW HAMPSHIRE", "NH", "33"),
    ("NEW JERSEY", "NJ", "34"),
    ("NEW MEXICO", "NM", "35"),
    ("NEW YORK", "NY", "36"),
    ("NORTH CAROLINA", "NC", "37"),
    ("NORTH DAKOTA", "ND", "38"),
    ("OHIO", "OH", "39"),
    ("OKLAHOMA", "OK", "40"),
    ("OREGON", "OR", "41"),
    ("PENNSYLVANIA", "PA", "42"),
    ("RHODE ISLAND", "RI", "44"),
    ("SOUTH CAROLINA", "SC", "45"),
    ("SOUTH DAKOTA", "SD", "46"),
    ("TENNESSEE", "TN", "47"),
    ("TEXAS", "TX", "48"),
    ("UTAH", "UT", "49"),
    ("VERMONT", "VT", "50"),
    ("VIRGINIA", "VA", "51"),
    ("WASHINGTON", "WA", "53"),
    ("WEST VIRGINIA", "WV", "54"),
    ("WISCONSIN", "WI", "55"),
    ("WYOMING", "WY", "56"),
    ("PUERTO RICO", "PR", "72"),
    ("VIRGIN ISLANDS", "VI", "78"),
    ("AMERICAN SAMOA", "AS", "60"),
    ("GUAM", "GU", "66"),
    ("NORTHERN MARIANA ISLANDS", "MP", "69"),
];

/// Extra spellings the CMS locality file has used over the years.
const EXTRA_ALIASES: [(&str, &str); 6] = [
    ("WASHINGTON DC", "DC"),
    ("WASHINGTON D.C.", "DC"),
    ("D.C.", "DC"),
    ("WASH DC", "DC"),
    ("U.S. VIRGIN ISLANDS", "VI"),
    ("N. MARIANA ISLANDS", "MP"),
];

static LOOKUP: LazyLock<HashMap<String, (&'static str, &'static str)>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for (name, postal, fips) in STATES {
        map.insert(name.to_string(), (postal, fips));
        map.insert(postal.to_string(), (postal, fips));
    }
    for (alias, postal) in EXTRA_ALIASES {
        if let Some((_, p, f)) = STATES.iter().find(|(_, code, _)| *code == postal) {
            map.insert(alias.to_string(), (*p, *f));
        }
    }
    map
});

fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// Resolve a state display name or postal code to
/// `(postal_code, state_fips)`, case- and whitespace-insensitive.
#[must_use]
pub fn resolve_state(raw: &str) -> Option<(&'static str, &'static str)> {
    LOOKUP.get(&normalize_key(raw)).copied()
}

/// Postal code for a state FIPS, when known.
#[must_use]
pub fn postal_for_fips(state_fips: &str) -> Option<&'static str> {
    STATES
        .iter()
        .find(|(_, _, fips)| *fips == state_fips)
        .map(|(_, postal, _)| *postal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_full_names_and_postal() {
        assert_eq!(resolve_state("CALIFORNIA"), Some(("CA", "06")));
        assert_eq!(resolve_state("ca"), Some(("CA", "06")));
        assert_eq!(resolve_state("  district  of  columbia "), Some(("DC", "11")));
    }

    #[test]
    fn resolves_aliases() {
        assert_eq!(resolve_state("WASHINGTON D.C."), Some(("DC", "11")));
    }

    #[test]
    fn unknown_state_is_none() {
        assert_eq!(resolve_state("NARNIA"), None);
    }

    #[test]
    fn fips_to_postal_round_trip() {
        assert_eq!(postal_for_fips("06"), Some("CA"));
        assert_eq!(postal_for_fips("99"), None);
    }
}
