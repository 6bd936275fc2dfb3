use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static STOREY_RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+) TO (\d+)$").expect("valid storey range regex"));

static NON_ALNUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9A-Za-z]+").expect("valid sanitizer regex"));

/// `"04 TO 06"` -> `(4, 6)`
pub fn parse_storey_range(value: &str) -> Option<(u32, u32)> {
    let caps = STOREY_RANGE_RE.captures(value.trim())?;
    let min = caps[1].parse().ok()?;
    let max = caps[2].parse().ok()?;
    Some((min, max))
}

/// Uppercased town with non-alphanumeric runs replaced by `_`
pub fn sanitize_town(town: &str) -> String {
    NON_ALNUM_RE.replace_all(&town.trim().to_uppercase(), "_").into_owned()
}

/// `town_` followed by the sanitized town
pub fn town_view_name(town: &str) -> String {
    format!("town_{}", sanitize_town(town))
}

/// Make every name distinct, in order. A repeated name gets the first free
/// `_2`, `_3`, ... suffix.
pub fn disambiguate<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let names: Vec<String> = names.into_iter().collect();
    let mut used: BTreeSet<String> = BTreeSet::new();
    let taken: BTreeSet<&str> = names.iter().map(String::as_str).collect();
    let mut out = Vec::with_capacity(names.len());

    for name in &names {
        let unique = if used.contains(name) {
            let mut n = 2;
            loop {
                let candidate = format!("{}_{}", name, n);
                if !used.contains(&candidate) && !taken.contains(candidate.as_str()) {
                    break candidate;
                }
                n += 1;
            }
        } else {
            name.clone()
        };
        used.insert(unique.clone());
        out.push(unique);
    }
    out
}

pub fn floor_view_name(floor: u32) -> String {
    format!("Floor_{:02}", floor)
}

pub fn helper_view_name(cleaned_table: &str) -> String {
    format!("{}_with_storeys", cleaned_table)
}

/// Views to create over a cleaned table, derived from its distinct towns and storey bands
#[derive(Debug, Clone, PartialEq)]
pub struct ViewPlan {
    pub helper: String,
    /// (view name, town literal); names are distinct even when towns sanitize alike
    pub towns: Vec<(String, String)>,
    /// Every storey appearing as a band bound, ascending
    pub floors: Vec<u32>,
}

impl ViewPlan {
    pub fn new<'a, T, S>(cleaned_table: &str, towns: T, storey_ranges: S) -> Self
    where
        T: IntoIterator<Item = &'a str>,
        S: IntoIterator<Item = &'a str>,
    {
        let distinct_towns: BTreeSet<&str> = towns
            .into_iter()
            .map(str::trim)
            .filter(|t| !t.is_empty() && *t != super::TEXT_SENTINEL)
            .collect();

        let floors: BTreeSet<u32> = storey_ranges
            .into_iter()
            .filter_map(parse_storey_range)
            .flat_map(|(lo, hi)| [lo, hi])
            .collect();

        Self {
            helper: helper_view_name(cleaned_table),
            towns: disambiguate(distinct_towns.iter().map(|t| town_view_name(t)))
                .into_iter()
                .zip(distinct_towns.iter().map(|t| t.to_string()))
                .collect(),
            floors: floors.into_iter().collect(),
        }
    }

    /// Helper view first, then town views, then floor views
    pub fn view_names(&self) -> Vec<String> {
        let mut names = vec![self.helper.clone()];
        names.extend(self.towns.iter().map(|(view, _)| view.clone()));
        names.extend(self.floors.iter().map(|&f| floor_view_name(f)));
        names
    }
}
