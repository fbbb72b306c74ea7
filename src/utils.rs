use chrono::Month;
use serde::Serialize;

/// Map a 0-based issue month (0 = January) to its calendar month.
///
/// Returns `None` outside `0..=11`.
pub fn issue_month(index0: u32) -> Option<Month> {
    let one_based = u8::try_from(index0.checked_add(1)?).ok()?;
    Month::try_from(one_based).ok()
}

/// Three-letter English abbreviation ("Jan" .. "Dec").
pub fn month_abbrev(month: Month) -> &'static str {
    &month.name()[..3]
}

/// Serialize a serde-backed enum into its string name.
pub fn serde_enum_name<T: Serialize>(val: &T) -> Option<String> {
    serde_json::to_value(val).ok()?.as_str().map(|s| s.to_string())
}

/// Split a comma separated list, trimming entries and skipping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_month_mapping_is_total_for_all_twelve_indices() {
        let expected = [
            "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
        ];
        for (idx, abbrev) in expected.iter().enumerate() {
            let month = issue_month(idx as u32).expect("index within 0..=11");
            assert_eq!(month_abbrev(month), *abbrev);
        }
    }

    #[test]
    fn issue_month_rejects_out_of_range_indices() {
        assert!(issue_month(12).is_none());
        assert!(issue_month(255).is_none());
        assert!(issue_month(u32::MAX).is_none());
    }

    #[test]
    fn split_list_trims_and_skips_blanks() {
        assert_eq!(split_list(" 1, 2,,3 "), vec!["1", "2", "3"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn html_escape_replaces_markup() {
        assert_eq!(html_escape("<a href='x'>&</a>"), "&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;");
    }
}
